// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! MIR operands and rvalues.

use crate::{LocalId, MirType};

/// MIR operand - value that can be used
#[derive(Debug, Clone, PartialEq)]
pub enum MirOperand {
    Local(LocalId),
    Constant(MirConst),
}

impl MirOperand {
    pub fn int(v: i64) -> Self {
        MirOperand::Constant(MirConst::Int(v))
    }

    pub fn bool(v: bool) -> Self {
        MirOperand::Constant(MirConst::Bool(v))
    }

    pub fn null() -> Self {
        MirOperand::Constant(MirConst::NullPtr)
    }
}

/// MIR constant value
#[derive(Debug, Clone, PartialEq)]
pub enum MirConst {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Null data pointer, passed where a zero-sized value would live.
    NullPtr,
    /// All-zero value of the given type.
    Zero(MirType),
}

/// MIR rvalue - right-hand side of assignment
#[derive(Debug, Clone, PartialEq)]
pub enum MirRValue {
    Use(MirOperand),
    /// Load through a pointer; the width comes from the destination local.
    Deref(MirOperand),
    BinaryOp {
        op: BinOp,
        left: MirOperand,
        right: MirOperand,
    },
    UnaryOp {
        op: UnaryOp,
        operand: MirOperand,
    },
    /// Integer casts extend by the signedness of the source type and
    /// truncate when narrowing.
    Cast {
        value: MirOperand,
        target_ty: MirType,
    },
    Field {
        base: MirOperand,
        field_index: u32,
    },
    /// Build a struct/tuple value from its fields.
    Aggregate {
        ty: MirType,
        fields: Vec<MirOperand>,
    },
}

/// Comparisons are unsigned when their operands have unsigned types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Function reference for calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub name: String,
    /// True for runtime entry points, which follow the C ABI.
    pub is_extern: bool,
}

impl FunctionRef {
    /// Call to another lowered function.
    pub fn internal(name: String) -> Self {
        Self { name, is_extern: false }
    }

    /// Call into the runtime library.
    pub fn extern_c(name: String) -> Self {
        Self { name, is_extern: true }
    }
}
