// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Strand runtime library.
//!
//! Cooperative, single-core scheduler plus the channel machinery that
//! lowered code calls into. Tasks are stackless futures parked in an arena;
//! they only give up the processor at channel operations, `yield_now` and
//! `sleep`.
//!
//! Components:
//! - `task`: task arena, pause/resume primitive
//! - `queue`: FIFO run queue threaded through the arena
//! - `sleep`: delta-encoded sleep queue
//! - `timer`: absolute-deadline timer queue (interrupt safe)
//! - `channel`: bounded/rendezvous channels with wait lists
//! - `select`: multi-way choice over channel operations
//! - `scheduler`: the run loop and the `Handle` tasks talk to
//! - `abi`: entry points for generated code; escalates contract violations

pub mod abi;
pub mod channel;
pub mod clock;
pub mod config;
pub mod critical;
pub mod error;
pub mod event;
pub mod op;
pub mod queue;
pub mod scheduler;
pub mod select;
pub mod sleep;
pub mod task;
pub mod timer;

pub use channel::ChanId;
pub use clock::{Clock, ManualClock, MonotonicClock, Ticks};
pub use config::SchedulerConfig;
pub use error::{ChannelError, RuntimeError};
pub use event::Notifier;
pub use op::{AllocHint, ChannelOp, Direction, ElemLayout, OpData, SelectCase, SelectOutcome};
pub use scheduler::{Handle, Runtime, SchedulerState};
pub use task::{TaskId, TaskState};
pub use timer::{TimerHandle, TimerId};
