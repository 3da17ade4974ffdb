// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! FunctionBuilder - typed construction of SSA functions.
//!
//! Result types are derived from the operands, so a front end (or a test)
//! only states the types it introduces: parameters, constants and channel
//! element types.

use crate::{
    BinOp, Block, BlockId, ChanDir, Constant, Instr, InstrKind, SelectState, SsaFunction, Terminator,
    Type, UnOp, ValueId, ValueInfo,
};

pub struct FunctionBuilder {
    function: SsaFunction,
    current_block: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, ret_ty: Type) -> Self {
        let entry = BlockId(0);
        Self {
            function: SsaFunction {
                name: name.into(),
                params: Vec::new(),
                ret_ty,
                values: Vec::new(),
                blocks: vec![Block {
                    id: entry,
                    instrs: Vec::new(),
                    terminator: Terminator::Unreachable,
                }],
            },
            current_block: entry,
        }
    }

    pub fn param(&mut self, name: impl Into<String>, ty: Type) -> ValueId {
        let id = self.new_value(ty, Some(name.into()));
        self.function.params.push(id);
        id
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.function.blocks.len() as u32);
        self.function.blocks.push(Block {
            id,
            instrs: Vec::new(),
            terminator: Terminator::Unreachable,
        });
        id
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    /// Type of a value created by this builder.
    pub fn type_of(&self, id: ValueId) -> &Type {
        &self.function.values[id.0 as usize].ty
    }

    /// Give the value a source-level name, used in dumps.
    pub fn name(&mut self, id: ValueId, name: impl Into<String>) {
        self.function.values[id.0 as usize].name = Some(name.into());
    }

    fn new_value(&mut self, ty: Type, name: Option<String>) -> ValueId {
        let id = ValueId(self.function.values.len() as u32);
        self.function.values.push(ValueInfo { ty, name });
        id
    }

    fn push(&mut self, result_ty: Option<Type>, kind: InstrKind) -> Option<ValueId> {
        let result = result_ty.map(|ty| self.new_value(ty, None));
        self.function.blocks[self.current_block.0 as usize]
            .instrs
            .push(Instr { result, kind });
        result
    }

    fn push_value(&mut self, ty: Type, kind: InstrKind) -> ValueId {
        let id = self.new_value(ty, None);
        self.function.blocks[self.current_block.0 as usize]
            .instrs
            .push(Instr {
                result: Some(id),
                kind,
            });
        id
    }

    fn elem_of(&self, chan: ValueId) -> Type {
        self.type_of(chan).chan_elem().cloned().unwrap_or(Type::Void)
    }

    pub fn const_int(&mut self, ty: Type, value: i64) -> ValueId {
        self.push_value(ty, InstrKind::Const(Constant::Int(value)))
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.push_value(Type::Bool, InstrKind::Const(Constant::Bool(value)))
    }

    pub fn zero(&mut self, ty: Type) -> ValueId {
        self.push_value(ty, InstrKind::Const(Constant::Zero))
    }

    pub fn binop(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = match op {
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => Type::Bool,
            _ => self.type_of(lhs).clone(),
        };
        self.push_value(ty, InstrKind::BinOp { op, lhs, rhs })
    }

    pub fn unop(&mut self, op: UnOp, x: ValueId) -> ValueId {
        let ty = self.type_of(x).clone();
        self.push_value(ty, InstrKind::UnOp { op, x })
    }

    /// Call returning `ret_ty`; `Type::Void` produces no value.
    pub fn call(&mut self, func: impl Into<String>, args: Vec<ValueId>, ret_ty: Type) -> Option<ValueId> {
        let result_ty = (ret_ty != Type::Void).then_some(ret_ty);
        self.push(
            result_ty,
            InstrKind::Call {
                func: func.into(),
                args,
            },
        )
    }

    pub fn make_chan(&mut self, elem: Type, size: ValueId) -> ValueId {
        self.push_value(Type::chan(elem), InstrKind::MakeChan { size })
    }

    pub fn send(&mut self, chan: ValueId, value: ValueId) {
        self.push(None, InstrKind::Send { chan, value });
    }

    pub fn recv(&mut self, chan: ValueId) -> ValueId {
        let elem = self.elem_of(chan);
        self.push_value(
            elem,
            InstrKind::Recv {
                chan,
                comma_ok: false,
            },
        )
    }

    /// `v, ok := <-chan`; returns the tuple, unpack it with `extract`.
    pub fn recv_ok(&mut self, chan: ValueId) -> ValueId {
        let elem = self.elem_of(chan);
        self.push_value(
            Type::Tuple(vec![elem, Type::Bool]),
            InstrKind::Recv {
                chan,
                comma_ok: true,
            },
        )
    }

    pub fn close(&mut self, chan: ValueId) {
        self.push(None, InstrKind::Close { chan });
    }

    pub fn select(&mut self, states: Vec<SelectState>, blocking: bool) -> ValueId {
        let mut fields = vec![Type::INT, Type::Bool];
        fields.extend(
            states
                .iter()
                .filter(|s| s.dir == ChanDir::Recv)
                .map(|s| self.elem_of(s.chan)),
        );
        self.push_value(Type::Tuple(fields), InstrKind::Select { states, blocking })
    }

    pub fn extract(&mut self, tuple: ValueId, index: u32) -> ValueId {
        let ty = match self.type_of(tuple) {
            Type::Tuple(fields) | Type::Struct(fields) => {
                fields.get(index as usize).cloned().unwrap_or(Type::Void)
            }
            _ => Type::Void,
        };
        self.push_value(ty, InstrKind::Extract { tuple, index })
    }

    pub fn jump(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump(target));
    }

    pub fn branch(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::If {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(Terminator::Return(value));
    }

    fn terminate(&mut self, term: Terminator) {
        self.function.blocks[self.current_block.0 as usize].terminator = term;
    }

    pub fn finish(self) -> SsaFunction {
        self.function
    }
}
