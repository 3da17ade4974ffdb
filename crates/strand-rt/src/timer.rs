// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Timer queue.
//!
//! Unlike the sleep queue, timers are armed and cancelled at arbitrary
//! absolute times, so nodes store absolute deadlines and are kept sorted by
//! them. Removal by identity scans the queue. Every mutation happens inside
//! the critical section because interrupt handlers arm and cancel timers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::clock::Ticks;
use crate::event::External;
use crate::scheduler::Handle;

/// Invoked inline by the scheduler loop with the lateness of the firing.
/// Re-arming is done through the handle.
pub type TimerCallback = Box<dyn FnOnce(&Handle, Ticks) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

pub(crate) struct TimerNode {
    pub id: TimerId,
    pub when: Ticks,
    pub callback: TimerCallback,
}

impl fmt::Debug for TimerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerNode")
            .field("id", &self.id)
            .field("when", &self.when)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    nodes: VecDeque<TimerNode>,
    next_id: u64,
}

impl TimerQueue {
    /// Arm a timer. Timers with equal deadlines fire in arming order.
    pub fn add(&mut self, when: Ticks, callback: TimerCallback) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let pos = self
            .nodes
            .iter()
            .position(|n| when < n.when)
            .unwrap_or(self.nodes.len());
        self.nodes.insert(pos, TimerNode { id, when, callback });
        id
    }

    /// Cancel a timer. False if it already fired or never existed.
    pub fn remove(&mut self, id: TimerId) -> bool {
        match self.nodes.iter().position(|n| n.id == id) {
            Some(pos) => {
                self.nodes.remove(pos);
                log::trace!("removed timer {:?}", id);
                true
            }
            None => {
                log::trace!("did not remove timer {:?}", id);
                false
            }
        }
    }

    /// Detach the head if it is due, with how late it is.
    pub fn pop_expired(&mut self, now: Ticks) -> Option<(TimerNode, Ticks)> {
        if self.nodes.front()?.when > now {
            return None;
        }
        let node = self.nodes.pop_front()?;
        let delay = now - node.when;
        Some((node, delay))
    }

    pub fn time_left(&self, now: Ticks) -> Option<Ticks> {
        self.nodes.front().map(|n| n.when.saturating_sub(now))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// `Send` handle for arming and cancelling timers from interrupt context.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    pub(crate) external: Arc<External>,
}

impl TimerHandle {
    pub fn add_timer(
        &self,
        when: Ticks,
        callback: impl FnOnce(&Handle, Ticks) + Send + 'static,
    ) -> TimerId {
        let id = self
            .external
            .timers
            .with(|q| q.add(when, Box::new(callback)));
        self.external.kick();
        id
    }

    pub fn remove_timer(&self, id: TimerId) -> bool {
        self.external.timers.with(|q| q.remove(id))
    }
}
