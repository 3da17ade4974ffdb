// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Sleep queue.
//!
//! Singly linked through the task arena and sorted by absolute wake time,
//! but each task's `data` holds only the delta after the previous entry
//! fires. The head is anchored at `base`. Waking the head is a single
//! comparison; inserting walks the chain once.

use crate::clock::Ticks;
use crate::task::{TaskArena, TaskId, TaskState};

#[derive(Debug, Default)]
pub(crate) struct SleepQueue {
    head: Option<TaskId>,
    /// Tick at which the head's delta started counting.
    base: Ticks,
}

impl SleepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Park `id` until `now + duration`.
    pub fn insert(&mut self, tasks: &mut TaskArena, id: TaskId, duration: Ticks, now: Ticks) {
        debug_assert!(!tasks[id].queued, "{} is already queued", id);

        // Deltas are measured from `base`, which may lie in the past.
        let mut delta = if self.head.is_none() {
            self.base = now;
            duration
        } else {
            duration.saturating_add(now.saturating_sub(self.base))
        };

        let mut prev: Option<TaskId> = None;
        let mut cur = self.head;
        while let Some(c) = cur {
            if delta < tasks[c].data {
                break;
            }
            delta -= tasks[c].data;
            prev = Some(c);
            cur = tasks[c].next;
        }
        if let Some(c) = cur {
            tasks[c].data -= delta;
        }

        let task = &mut tasks[id];
        task.data = delta;
        task.next = cur;
        task.queued = true;
        task.state = TaskState::Sleeping;
        match prev {
            Some(p) => tasks[p].next = Some(id),
            None => self.head = Some(id),
        }
        log::trace!("set sleep: {} for {} ticks (delta {})", id, duration, delta);
    }

    /// Detach the head if its deadline has passed.
    pub fn pop_expired(&mut self, tasks: &mut TaskArena, now: Ticks) -> Option<TaskId> {
        let id = self.head?;
        let delta = tasks[id].data;
        if now.saturating_sub(self.base) < delta {
            return None;
        }
        self.base += delta;
        let task = &mut tasks[id];
        self.head = task.next.take();
        task.queued = false;
        task.data = 0;
        Some(id)
    }

    /// Ticks until the head wakes, or None if the queue is empty.
    pub fn time_left(&self, tasks: &TaskArena, now: Ticks) -> Option<Ticks> {
        let id = self.head?;
        Some(tasks[id].data.saturating_sub(now.saturating_sub(self.base)))
    }

    /// Walk the queue, yielding `(task, absolute wake tick)`.
    #[cfg(test)]
    pub fn entries(&self, tasks: &TaskArena) -> Vec<(TaskId, Ticks)> {
        let mut out = Vec::new();
        let mut at = self.base;
        let mut cur = self.head;
        while let Some(c) = cur {
            at += tasks[c].data;
            out.push((c, at));
            cur = tasks[c].next;
        }
        out
    }
}
