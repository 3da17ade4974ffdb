// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! BlockBuilder - helper for CFG construction during lowering.
//!
//! Block and local ids are positions in the function's vectors, so they are
//! handed out densely in creation order.

use crate::{BlockId, LocalId, MirBlock, MirFunction, MirLocal, MirStmt, MirTerminator, MirType};

pub struct BlockBuilder {
    function: MirFunction,
    current_block: BlockId,
}

fn empty_block(id: BlockId) -> MirBlock {
    MirBlock {
        id,
        statements: Vec::new(),
        terminator: MirTerminator::Unreachable,
    }
}

impl BlockBuilder {
    pub fn new(name: String, ret_ty: MirType) -> Self {
        let entry = BlockId(0);
        Self {
            function: MirFunction {
                name,
                params: Vec::new(),
                ret_ty,
                locals: Vec::new(),
                blocks: vec![empty_block(entry)],
                entry_block: entry,
            },
            current_block: entry,
        }
    }

    /// Append a block ending in `Unreachable` until terminated.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.function.blocks.len() as u32);
        self.function.blocks.push(empty_block(id));
        id
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    fn push_local(&mut self, name: Option<String>, ty: MirType, is_param: bool) -> LocalId {
        let local = MirLocal {
            id: LocalId(self.function.locals.len() as u32),
            name,
            ty,
            is_param,
        };
        if is_param {
            self.function.params.push(local.clone());
        }
        let id = local.id;
        self.function.locals.push(local);
        id
    }

    pub fn alloc_temp(&mut self, ty: MirType) -> LocalId {
        self.push_local(None, ty, false)
    }

    pub fn alloc_local(&mut self, name: String, ty: MirType) -> LocalId {
        self.push_local(Some(name), ty, false)
    }

    pub fn add_param(&mut self, name: String, ty: MirType) -> LocalId {
        self.push_local(Some(name), ty, true)
    }

    fn block_mut(&mut self) -> &mut MirBlock {
        &mut self.function.blocks[self.current_block.0 as usize]
    }

    pub fn push_stmt(&mut self, stmt: MirStmt) {
        self.block_mut().statements.push(stmt);
    }

    pub fn terminate(&mut self, term: MirTerminator) {
        self.block_mut().terminator = term;
    }

    pub fn finish(self) -> MirFunction {
        self.function
    }
}
