// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Runtime errors.
//!
//! The library API reports everything as `Result`. Lowered code goes through
//! `abi`, which turns the contract violations below into a fatal
//! `runtime_panic` instead of handing them back.

use std::fmt;

use thiserror::Error;

use crate::op::Direction;

/// Channel contract violations and lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// `capacity * elem_size` overflowed or exceeded the configured maximum.
    /// Reported before any buffer is allocated.
    #[error("makechan: size out of range")]
    CapacityOutOfRange { capacity: usize, elem_size: usize },

    /// The inline size check in lowered code failed. Carries no numbers:
    /// the check only hands over that it failed.
    #[error("makechan: size out of range")]
    SizeCheckFailed,

    #[error("send on closed channel")]
    SendOnClosed,

    #[error("close of closed channel")]
    CloseOfClosed,

    #[error("unknown channel handle")]
    UnknownChannel,

    /// A descriptor was handed to the wrong primitive (recv op to send etc).
    #[error("descriptor direction mismatch: expected {expected}")]
    DirectionMismatch { expected: Direction },
}

/// Scheduler-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Nothing is runnable and no sleep, timer or external event can ever
    /// make progress. `parked` counts the tasks left behind.
    #[error("all tasks are asleep - deadlock!")]
    Deadlock { parked: usize },

    #[error("unknown task")]
    UnknownTask,

    /// A suspending operation was called outside of any task.
    #[error("blocking operation outside of a task")]
    NotInTask,
}

/// Report a fatal contract violation and abort the current execution.
///
/// Never returns; the panic unwinds through the scheduler loop.
#[track_caller]
pub fn runtime_panic(msg: impl fmt::Display) -> ! {
    log::error!("panic: {}", msg);
    panic!("{}", msg)
}
