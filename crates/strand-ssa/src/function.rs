// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Functions, blocks and instructions.

use crate::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockId(pub u32);

/// Direction of a channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChanDir {
    Send,
    Recv,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Float(f64),
    /// The zero value of the constant's type.
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnOp {
    Neg,
    Not,
}

/// One branch of a select.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectState {
    pub chan: ValueId,
    pub dir: ChanDir,
    /// Value to send; set exactly for `ChanDir::Send`.
    pub send: Option<ValueId>,
}

impl SelectState {
    pub fn recv(chan: ValueId) -> Self {
        Self {
            chan,
            dir: ChanDir::Recv,
            send: None,
        }
    }

    pub fn send(chan: ValueId, value: ValueId) -> Self {
        Self {
            chan,
            dir: ChanDir::Send,
            send: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstrKind {
    Const(Constant),
    BinOp {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    UnOp {
        op: UnOp,
        x: ValueId,
    },
    Call {
        func: String,
        args: Vec<ValueId>,
    },
    /// `make(chan T, size)`. The element type comes from the result type.
    MakeChan {
        size: ValueId,
    },
    Send {
        chan: ValueId,
        value: ValueId,
    },
    /// `<-chan`; with `comma_ok` the result is a `(T, bool)` tuple.
    Recv {
        chan: ValueId,
        comma_ok: bool,
    },
    Close {
        chan: ValueId,
    },
    /// Result is `(int, bool, recv values...)`: the chosen branch, whether
    /// a receive got a real value, then one slot per receive branch.
    Select {
        states: Vec<SelectState>,
        blocking: bool,
    },
    Extract {
        tuple: ValueId,
        index: u32,
    },
}

impl InstrKind {
    /// Values read by this instruction.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            InstrKind::Const(_) => vec![],
            InstrKind::BinOp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstrKind::UnOp { x, .. } => vec![*x],
            InstrKind::Call { args, .. } => args.clone(),
            InstrKind::MakeChan { size } => vec![*size],
            InstrKind::Send { chan, value } => vec![*chan, *value],
            InstrKind::Recv { chan, .. } | InstrKind::Close { chan } => vec![*chan],
            InstrKind::Select { states, .. } => states
                .iter()
                .flat_map(|s| std::iter::once(s.chan).chain(s.send))
                .collect(),
            InstrKind::Extract { tuple, .. } => vec![*tuple],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instr {
    /// Defined value, if the instruction produces one.
    pub result: Option<ValueId>,
    pub kind: InstrKind,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Terminator {
    Jump(BlockId),
    If {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<ValueId>),
    /// Block not finished by the front end.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueInfo {
    pub ty: Type,
    pub name: Option<String>,
}

/// A function in SSA form. Value ids index `values`; block ids index
/// `blocks`, and block 0 is the entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SsaFunction {
    pub name: String,
    pub params: Vec<ValueId>,
    pub ret_ty: Type,
    pub values: Vec<ValueInfo>,
    pub blocks: Vec<Block>,
}

impl SsaFunction {
    pub fn value(&self, id: ValueId) -> Option<&ValueInfo> {
        self.values.get(id.0 as usize)
    }

    pub fn value_type(&self, id: ValueId) -> Option<&Type> {
        self.value(id).map(|v| &v.ty)
    }

    /// The instruction defining `id`, if it is not a parameter.
    pub fn definition(&self, id: ValueId) -> Option<&Instr> {
        self.blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .find(|i| i.result == Some(id))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    pub functions: Vec<SsaFunction>,
}
