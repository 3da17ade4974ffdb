// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! MIR lowering - transform SSA functions to MIR CFG.
//!
//! Every SSA value owns exactly one MIR local, assigned once. SSA block `n`
//! becomes MIR block `n`; blocks created while lowering an instruction
//! (bounds-check panics, code after a deadlock) are appended after them.

mod channel;

use std::collections::{HashMap, HashSet};

use strand_ssa::{
    BinOp as SsaBinOp, Constant, Instr, InstrKind, Program, SsaFunction, Terminator, Type,
    UnOp as SsaUnOp, ValueId,
};

use crate::{
    BinOp, BlockBuilder, BlockId, FunctionRef, LocalId, LowerOptions, MirConst, MirFunction,
    MirOperand, MirRValue, MirStmt, MirTerminator, MirType, UnaryOp,
};

/// Runtime entry points called by lowered code.
pub mod runtime_fn {
    pub const CHAN_MAKE: &str = "rt_chan_make";
    pub const CHAN_MAKE_PANIC: &str = "rt_chan_make_panic";
    pub const CHAN_SEND: &str = "rt_chan_send";
    pub const CHAN_RECV: &str = "rt_chan_recv";
    pub const CHAN_CLOSE: &str = "rt_chan_close";
    pub const CHAN_SELECT: &str = "rt_chan_select";
    pub const DEADLOCK: &str = "rt_deadlock";

    pub const ALL: [&str; 7] = [
        CHAN_MAKE,
        CHAN_MAKE_PANIC,
        CHAN_SEND,
        CHAN_RECV,
        CHAN_CLOSE,
        CHAN_SELECT,
        DEADLOCK,
    ];
}

pub struct MirLowerer<'a> {
    func: &'a SsaFunction,
    options: &'a LowerOptions,
    builder: BlockBuilder,
    locals: HashMap<ValueId, LocalId>,
    /// Receive buffer of each lowered select, for later extracts.
    select_buffers: HashMap<ValueId, MirOperand>,
}

impl<'a> MirLowerer<'a> {
    pub fn lower_function(
        func: &'a SsaFunction,
        options: &'a LowerOptions,
    ) -> Result<MirFunction, LoweringError> {
        let layout = &options.layout;
        let mut lowerer = MirLowerer {
            func,
            options,
            builder: BlockBuilder::new(func.name.clone(), layout.mir_type(&func.ret_ty)),
            locals: HashMap::new(),
            select_buffers: HashMap::new(),
        };

        for &param in &func.params {
            let info = func.value(param).ok_or(LoweringError::UnknownValue(param.0))?;
            let name = info.name.clone().unwrap_or_else(|| format!("v{}", param.0));
            let local = lowerer.builder.add_param(name, layout.mir_type(&info.ty));
            lowerer.locals.insert(param, local);
        }
        // The runtime hands back only (index, ok) for a select; received
        // values are read from its buffer by the extracts.
        let selects: HashSet<ValueId> = func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .filter(|i| matches!(i.kind, InstrKind::Select { .. }))
            .filter_map(|i| i.result)
            .collect();
        for (i, info) in func.values.iter().enumerate() {
            let id = ValueId(i as u32);
            if lowerer.locals.contains_key(&id) {
                continue;
            }
            let ty = if selects.contains(&id) {
                select_result_type()
            } else {
                layout.mir_type(&info.ty)
            };
            let local = match &info.name {
                Some(name) => lowerer.builder.alloc_local(name.clone(), ty),
                None => lowerer.builder.alloc_temp(ty),
            };
            lowerer.locals.insert(id, local);
        }

        for _ in 1..func.blocks.len() {
            lowerer.builder.create_block();
        }
        for (i, block) in func.blocks.iter().enumerate() {
            if block.id.0 as usize != i {
                return Err(LoweringError::InvalidConstruct(format!(
                    "block {} listed at position {}",
                    block.id.0, i
                )));
            }
            lowerer.builder.switch_to_block(BlockId(block.id.0));
            for instr in &block.instrs {
                lowerer.lower_instr(instr)?;
            }
            lowerer.lower_terminator(&block.terminator)?;
        }

        Ok(lowerer.builder.finish())
    }

    fn lower_instr(&mut self, instr: &Instr) -> Result<(), LoweringError> {
        match &instr.kind {
            InstrKind::Const(c) => {
                let dst = self.result(instr)?;
                let value = match c {
                    Constant::Int(v) => MirConst::Int(*v),
                    Constant::Bool(b) => MirConst::Bool(*b),
                    Constant::Float(v) => MirConst::Float(*v),
                    Constant::Zero => {
                        let ty = self.result_type(instr)?;
                        MirConst::Zero(self.options.layout.mir_type(ty))
                    }
                };
                self.assign(dst, MirRValue::Use(MirOperand::Constant(value)));
            }
            InstrKind::BinOp { op, lhs, rhs } => {
                let dst = self.result(instr)?;
                let rvalue = MirRValue::BinaryOp {
                    op: binop(*op),
                    left: self.operand(*lhs)?,
                    right: self.operand(*rhs)?,
                };
                self.assign(dst, rvalue);
            }
            InstrKind::UnOp { op, x } => {
                let dst = self.result(instr)?;
                let op = match op {
                    SsaUnOp::Neg => UnaryOp::Neg,
                    SsaUnOp::Not => UnaryOp::Not,
                };
                let operand = self.operand(*x)?;
                self.assign(dst, MirRValue::UnaryOp { op, operand });
            }
            InstrKind::Call { func, args } => {
                let dst = instr.result.map(|v| self.local(v)).transpose()?;
                let args = args
                    .iter()
                    .map(|a| self.operand(*a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.builder.push_stmt(MirStmt::Call {
                    dst,
                    func: FunctionRef::internal(func.clone()),
                    args,
                });
            }
            InstrKind::MakeChan { size } => self.lower_make_chan(instr, *size)?,
            InstrKind::Send { chan, value } => self.lower_send(*chan, *value)?,
            InstrKind::Recv { chan, comma_ok } => self.lower_recv(instr, *chan, *comma_ok)?,
            InstrKind::Close { chan } => self.lower_close(*chan)?,
            InstrKind::Select { states, blocking } => {
                self.lower_select(instr, states, *blocking)?
            }
            InstrKind::Extract { tuple, index } => self.lower_extract(instr, *tuple, *index)?,
        }
        Ok(())
    }

    fn lower_terminator(&mut self, term: &Terminator) -> Result<(), LoweringError> {
        let term = match term {
            Terminator::Jump(target) => MirTerminator::Goto {
                target: self.block(target.0)?,
            },
            Terminator::If {
                cond,
                then_block,
                else_block,
            } => MirTerminator::Branch {
                cond: self.operand(*cond)?,
                then_block: self.block(then_block.0)?,
                else_block: self.block(else_block.0)?,
            },
            Terminator::Return(value) => MirTerminator::Return {
                value: value.map(|v| self.operand(v)).transpose()?,
            },
            Terminator::Unreachable => MirTerminator::Unreachable,
        };
        self.builder.terminate(term);
        Ok(())
    }

    fn block(&self, id: u32) -> Result<BlockId, LoweringError> {
        if (id as usize) < self.func.blocks.len() {
            Ok(BlockId(id))
        } else {
            Err(LoweringError::InvalidConstruct(format!(
                "branch to unknown block {}",
                id
            )))
        }
    }

    fn local(&self, value: ValueId) -> Result<LocalId, LoweringError> {
        self.locals
            .get(&value)
            .copied()
            .ok_or(LoweringError::UnknownValue(value.0))
    }

    fn operand(&self, value: ValueId) -> Result<MirOperand, LoweringError> {
        self.local(value).map(MirOperand::Local)
    }

    fn value_type(&self, value: ValueId) -> Result<&'a Type, LoweringError> {
        self.func
            .value_type(value)
            .ok_or(LoweringError::UnknownValue(value.0))
    }

    fn result_value(&self, instr: &Instr) -> Result<ValueId, LoweringError> {
        instr.result.ok_or_else(|| {
            LoweringError::InvalidConstruct(format!("{:?} defines no value", instr.kind))
        })
    }

    fn result(&self, instr: &Instr) -> Result<LocalId, LoweringError> {
        self.local(self.result_value(instr)?)
    }

    fn result_type(&self, instr: &Instr) -> Result<&'a Type, LoweringError> {
        self.value_type(self.result_value(instr)?)
    }

    fn assign(&mut self, dst: LocalId, rvalue: MirRValue) {
        self.builder.push_stmt(MirStmt::Assign { dst, rvalue });
    }

    fn temp(&mut self, ty: MirType) -> LocalId {
        self.builder.alloc_temp(ty)
    }
}

/// Lower every function of a program with the same options.
pub fn lower_program(
    program: &Program,
    options: &LowerOptions,
) -> Result<Vec<MirFunction>, LoweringError> {
    program
        .functions
        .iter()
        .map(|f| MirLowerer::lower_function(f, options))
        .collect()
}

/// `(index, ok)` as returned by the select entry point.
fn select_result_type() -> MirType {
    MirType::Struct(vec![MirType::I32, MirType::Bool])
}

fn binop(op: SsaBinOp) -> BinOp {
    match op {
        SsaBinOp::Add => BinOp::Add,
        SsaBinOp::Sub => BinOp::Sub,
        SsaBinOp::Mul => BinOp::Mul,
        SsaBinOp::Div => BinOp::Div,
        SsaBinOp::Rem => BinOp::Mod,
        SsaBinOp::Eq => BinOp::Eq,
        SsaBinOp::Ne => BinOp::Ne,
        SsaBinOp::Lt => BinOp::Lt,
        SsaBinOp::Gt => BinOp::Gt,
        SsaBinOp::Le => BinOp::Le,
        SsaBinOp::Ge => BinOp::Ge,
        SsaBinOp::And => BinOp::And,
        SsaBinOp::Or => BinOp::Or,
        SsaBinOp::Xor => BinOp::BitXor,
        SsaBinOp::Shl => BinOp::Shl,
        SsaBinOp::Shr => BinOp::Shr,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoweringError {
    #[error("unknown SSA value v{0}")]
    UnknownValue(u32),
    #[error("v{0} is not a channel")]
    NotAChannel(u32),
    #[error("no receive buffer recorded for select v{0}")]
    MissingSelectBuffer(u32),
    #[error("cannot extract field {index} of v{tuple}")]
    InvalidExtract { tuple: u32, index: u32 },
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("invalid construct: {0}")]
    InvalidConstruct(String),
    #[error("channel size {size} out of range (must be below {max})")]
    ChanSizeOutOfRange { size: i128, max: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_ssa::{FunctionBuilder, IntWidth};

    #[test]
    fn arithmetic_maps_one_to_one() {
        let mut b = FunctionBuilder::new("add", Type::INT);
        let x = b.param("x", Type::INT);
        let one = b.const_int(Type::INT, 1);
        let sum = b.binop(SsaBinOp::Add, x, one);
        b.ret(Some(sum));
        let func = b.finish();

        let mir = MirLowerer::lower_function(&func, &LowerOptions::default()).unwrap();
        assert_eq!(mir.params.len(), 1);
        assert_eq!(mir.locals.len(), func.values.len());
        assert_eq!(mir.blocks.len(), 1);
        let stmts = &mir.blocks[0].statements;
        assert_eq!(stmts.len(), 2);
        assert!(matches!(
            &stmts[1],
            MirStmt::Assign { rvalue: MirRValue::BinaryOp { op: BinOp::Add, .. }, .. }
        ));
        assert!(matches!(
            mir.blocks[0].terminator,
            MirTerminator::Return { value: Some(MirOperand::Local(_)) }
        ));
    }

    #[test]
    fn branches_keep_block_numbering() {
        let mut b = FunctionBuilder::new("pick", Type::Void);
        let c = b.param("c", Type::Bool);
        let yes = b.create_block();
        let no = b.create_block();
        b.branch(c, yes, no);
        b.switch_to_block(yes);
        b.ret(None);
        b.switch_to_block(no);
        b.ret(None);
        let func = b.finish();

        let mir = MirLowerer::lower_function(&func, &LowerOptions::default()).unwrap();
        assert_eq!(
            mir.blocks[0].terminator,
            MirTerminator::Branch {
                cond: MirOperand::Local(LocalId(0)),
                then_block: BlockId(1),
                else_block: BlockId(2),
            }
        );
    }

    #[test]
    fn zero_constant_takes_result_type() {
        let mut b = FunctionBuilder::new("z", Type::Void);
        let t = Type::int(IntWidth::W16, false);
        b.zero(t);
        b.ret(None);
        let func = b.finish();
        let mir = MirLowerer::lower_function(&func, &LowerOptions::default()).unwrap();
        assert_eq!(
            mir.blocks[0].statements[0],
            MirStmt::Assign {
                dst: LocalId(0),
                rvalue: MirRValue::Use(MirOperand::Constant(MirConst::Zero(MirType::U16))),
            }
        );
    }

    #[test]
    fn jump_to_missing_block_is_rejected() {
        let mut b = FunctionBuilder::new("bad", Type::Void);
        b.jump(strand_ssa::BlockId(7));
        let func = b.finish();
        let err = MirLowerer::lower_function(&func, &LowerOptions::default()).unwrap_err();
        assert!(matches!(err, LoweringError::InvalidConstruct(_)));
    }

    #[test]
    fn entry_point_names_are_distinct() {
        let mut names = runtime_fn::ALL.to_vec();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), runtime_fn::ALL.len());
    }
}
