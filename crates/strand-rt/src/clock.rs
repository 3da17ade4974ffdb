// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Monotonic tick sources.
//!
//! One tick is one nanosecond. The scheduler never looks at wall-clock time,
//! so host clock adjustments cannot reorder the sleep queue.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub type Ticks = u64;

pub fn duration_to_ticks(d: Duration) -> Ticks {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Time source consulted by the scheduler loop.
pub trait Clock {
    /// Current tick. Must never go backwards.
    fn now(&self) -> Ticks;

    /// Idle the whole process for `ticks`. Called only when the run queue
    /// is empty and the next sleeper or timer is in the future.
    fn idle(&self, ticks: Ticks);
}

/// Host clock: ticks since construction, backed by `Instant`.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Ticks {
        duration_to_ticks(self.origin.elapsed())
    }

    fn idle(&self, ticks: Ticks) {
        std::thread::sleep(Duration::from_nanos(ticks));
    }
}

/// Virtual clock. Idling jumps time forward instead of sleeping, which makes
/// timing tests deterministic. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Ticks>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ticks: Ticks) {
        self.now.set(self.now.get().saturating_add(ticks));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ticks {
        self.now.get()
    }

    fn idle(&self, ticks: Ticks) {
        self.advance(ticks);
    }
}
