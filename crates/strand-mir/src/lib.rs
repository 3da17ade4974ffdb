// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! MIR (Mid-level Intermediate Representation) - non-SSA control-flow graph.
//!
//! MIR is the bridge between the typed SSA program and backend code
//! generation. It uses basic blocks with statements and terminators, and
//! channel operations appear only as calls into the runtime against
//! stack-allocated descriptors.

mod builder;
mod display;
mod function;
mod operand;
mod stmt;
mod target;
mod types;

pub mod lower;

pub use builder::BlockBuilder;
pub use function::{BlockId, LocalId, MirBlock, MirFunction, MirLocal};
pub use operand::{BinOp, FunctionRef, MirConst, MirOperand, MirRValue, UnaryOp};
pub use stmt::{MirStmt, MirTerminator};
pub use target::{DescriptorLayout, LowerOptions, TargetLayout, DIR_RECV, DIR_SEND};
pub use types::MirType;
