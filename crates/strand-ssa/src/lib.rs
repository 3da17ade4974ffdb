// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Typed, block-structured program representation.
//!
//! This is what the front end hands to the back end: every value has a
//! concrete type, control flow is a list of basic blocks, and channel
//! operations are explicit instructions tagged with their direction and
//! element type. Nothing here checks types; the front end already did.

mod builder;
mod function;
mod types;

pub use builder::FunctionBuilder;
pub use function::{
    BinOp, Block, BlockId, ChanDir, Constant, Instr, InstrKind, Program, SelectState, SsaFunction,
    Terminator, UnOp, ValueId, ValueInfo,
};
pub use types::{align_to, IntWidth, Type};
