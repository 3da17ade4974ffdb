// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! External event queue.
//!
//! The only door into the scheduler from outside its thread: interrupt
//! handlers and foreign wakers post task ids here, and the
//! scheduler drains them into the run queue at the top of every iteration.
//! When there is nothing else to do the scheduler sleeps on this queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar};
use std::task::Wake;

use crate::critical::Critical;
use crate::task::TaskId;
use crate::timer::TimerQueue;

#[derive(Debug, Default)]
struct Pending {
    resumes: VecDeque<TaskId>,
    /// Set when something other than a resume happened (timer armed).
    kicked: bool,
}

/// State shared between the scheduler and interrupt context.
#[derive(Debug, Default)]
pub(crate) struct External {
    pub timers: Critical<TimerQueue>,
    pending: Critical<Pending>,
    signal: Condvar,
}

impl External {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn post(&self, task: TaskId) {
        self.pending.with(|p| p.resumes.push_back(task));
        self.signal.notify_one();
    }

    pub fn kick(&self) {
        self.pending.with(|p| p.kicked = true);
        self.signal.notify_one();
    }

    pub fn take_pending(&self) -> VecDeque<TaskId> {
        self.pending.with(|p| {
            p.kicked = false;
            std::mem::take(&mut p.resumes)
        })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.with(|p| p.kicked || !p.resumes.is_empty())
    }

    /// Block the calling thread until something is posted.
    pub fn wait(&self) {
        let mut guard = self.pending.enter();
        while !guard.kicked && guard.resumes.is_empty() {
            guard = self
                .signal
                .wait(guard)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

/// `Send` handle for resuming tasks from another context.
///
/// Only tasks waiting in `Handle::wait_for_event` are resumed; posts for any
/// other task (still running, parked on a channel, exited) are dropped.
#[derive(Debug, Clone)]
pub struct Notifier {
    pub(crate) external: Arc<External>,
}

impl Notifier {
    pub fn resume(&self, task: TaskId) {
        self.external.post(task);
    }
}

/// Waker handed to task futures. Waking posts the task to the event queue,
/// which lets foreign futures (not built on this runtime) resume a task.
pub(crate) struct TaskWaker {
    pub task: TaskId,
    pub external: Arc<External>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.external.post(self.task);
    }
}
