// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Display implementations for MIR types.

use crate::*;
use std::fmt;

impl fmt::Display for MirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MirType::Array { elem, len } => return write!(f, "[{}; {}]", elem, len),
            MirType::Struct(fields) => {
                write!(f, "{{")?;
                for (i, t) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                return write!(f, "}}");
            }
            MirType::Void => "void",
            MirType::Bool => "bool",
            MirType::I8 => "i8",
            MirType::I16 => "i16",
            MirType::I32 => "i32",
            MirType::I64 => "i64",
            MirType::U8 => "u8",
            MirType::U16 => "u16",
            MirType::U32 => "u32",
            MirType::U64 => "u64",
            MirType::F32 => "f32",
            MirType::F64 => "f64",
            MirType::Int => "int",
            MirType::Uintptr => "uintptr",
            MirType::Ptr => "ptr",
        };
        f.write_str(name)
    }
}

impl fmt::Display for MirOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirOperand::Local(id) => write!(f, "_{}", id.0),
            MirOperand::Constant(c) => write!(f, "{}", c),
        }
    }
}

impl fmt::Display for MirConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirConst::Int(v) => write!(f, "{}", v),
            MirConst::Float(v) => write!(f, "{}", v),
            MirConst::Bool(v) => write!(f, "{}", v),
            MirConst::NullPtr => write!(f, "null"),
            MirConst::Zero(ty) => write!(f, "zeroed {}", ty),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        })
    }
}

impl fmt::Display for MirRValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirRValue::Use(op) => write!(f, "{}", op),
            MirRValue::Deref(op) => write!(f, "*{}", op),
            MirRValue::BinaryOp { op, left, right } => {
                write!(f, "{} {} {}", left, op, right)
            }
            MirRValue::UnaryOp { op, operand } => {
                write!(f, "{}{}", op, operand)
            }
            MirRValue::Cast { value, target_ty } => {
                write!(f, "{} as {}", value, target_ty)
            }
            MirRValue::Field { base, field_index } => {
                write!(f, "{}.{}", base, field_index)
            }
            MirRValue::Aggregate { ty, fields } => {
                write!(f, "{} {{", ty)?;
                for (i, op) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", op)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for MirStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirStmt::Assign { dst, rvalue } => {
                write!(f, "_{} = {}", dst.0, rvalue)
            }
            MirStmt::Store { addr, offset, value } => {
                write!(f, "*(_{}+{}) = {}", addr.0, offset, value)
            }
            MirStmt::Call { dst, func, args } => {
                if let Some(d) = dst {
                    write!(f, "_{} = ", d.0)?;
                }
                if func.is_extern {
                    write!(f, "extern ")?;
                }
                write!(f, "{}(", func.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            MirStmt::StackSlot { dst, name, size, align } => {
                write!(f, "_{} = stack_slot {} [size={}, align={}]", dst.0, name, size, align)
            }
            MirStmt::LifetimeEnd { slot, size } => {
                write!(f, "lifetime_end(_{}, {})", slot.0, size)
            }
        }
    }
}

impl fmt::Display for MirTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirTerminator::Return { value: Some(v) } => write!(f, "return {}", v),
            MirTerminator::Return { value: None } => write!(f, "return"),
            MirTerminator::Goto { target } => write!(f, "goto bb{}", target.0),
            MirTerminator::Branch { cond, then_block, else_block } => {
                write!(f, "if {} then bb{} else bb{}", cond, then_block.0, else_block.0)
            }
            MirTerminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for MirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &p.name {
                Some(name) => write!(f, "{}: {}", name, p.ty)?,
                None => write!(f, "_{}: {}", p.id.0, p.ty)?,
            }
        }
        writeln!(f, ") -> {} {{", self.ret_ty)?;

        let mut locals = self.locals.iter().filter(|l| !l.is_param).peekable();
        let any_locals = locals.peek().is_some();
        for local in locals {
            match &local.name {
                Some(name) => writeln!(f, "  let _{}: {}  // {}", local.id.0, local.ty, name)?,
                None => writeln!(f, "  let _{}: {}", local.id.0, local.ty)?,
            }
        }
        if any_locals {
            writeln!(f)?;
        }

        for block in &self.blocks {
            writeln!(f, "  bb{}:", block.id.0)?;
            for stmt in &block.statements {
                writeln!(f, "    {}", stmt)?;
            }
            writeln!(f, "    {}", block.terminator)?;
        }
        write!(f, "}}")
    }
}
