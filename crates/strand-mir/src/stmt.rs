// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! MIR statements and terminators.

use crate::{BlockId, FunctionRef, LocalId, MirOperand, MirRValue};

/// MIR statement - no control flow
#[derive(Debug, Clone, PartialEq)]
pub enum MirStmt {
    Assign {
        dst: LocalId,
        rvalue: MirRValue,
    },
    Store {
        addr: LocalId,
        offset: u32,
        value: MirOperand,
    },
    Call {
        dst: Option<LocalId>,
        func: FunctionRef,
        args: Vec<MirOperand>,
    },
    /// Reserve `size` bytes of stack in the current frame; `dst` gets the
    /// address. Lives until the matching `LifetimeEnd`.
    StackSlot {
        dst: LocalId,
        name: String,
        size: u64,
        align: u64,
    },
    /// The slot's contents are dead from here on.
    LifetimeEnd {
        slot: LocalId,
        size: u64,
    },
}

/// MIR terminator - ends a basic block
#[derive(Debug, Clone, PartialEq)]
pub enum MirTerminator {
    Return {
        value: Option<MirOperand>,
    },
    Goto {
        target: BlockId,
    },
    Branch {
        cond: MirOperand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}
