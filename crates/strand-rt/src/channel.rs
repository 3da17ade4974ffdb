// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Channels.
//!
//! A channel is a fixed-capacity ring of untyped elements plus two wait
//! lists. Capacity 0 makes it a rendezvous channel: every transfer is a
//! direct hand-off between a running task and a parked one.
//!
//! Wait lists hold `(task, branch)` entries and a private copy of the value
//! for senders. A task may sit on several lists at once (blocking select);
//! whichever operation admits it first removes it from all of them before
//! it is made runnable again.

use std::collections::VecDeque;

use crate::error::ChannelError;
use crate::op::{AllocHint, Direction, ElemLayout};
use crate::scheduler::Core;
use crate::task::{Park, TaskId, TaskState, Wakeup};

/// Handle to a channel owned by a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChanId(pub(crate) generational_arena::Index);

#[derive(Debug)]
pub(crate) struct Waiter {
    pub task: TaskId,
    /// Select branch index, 0 for plain send/recv.
    pub branch: usize,
    /// Senders only: the value being sent.
    pub value: Box<[u8]>,
}

#[derive(Debug)]
pub(crate) struct Channel {
    elem: ElemLayout,
    capacity: usize,
    ring: Vec<u8>,
    head: usize,
    len: usize,
    closed: bool,
    senders: VecDeque<Waiter>,
    receivers: VecDeque<Waiter>,
}

impl Channel {
    /// Bounds-checks `capacity * elem.size` before allocating anything.
    pub fn new(elem: ElemLayout, capacity: usize, max_bytes: usize) -> Result<Self, ChannelError> {
        let bytes = capacity
            .checked_mul(elem.size)
            .filter(|&b| b <= max_bytes)
            .ok_or(ChannelError::CapacityOutOfRange {
                capacity,
                elem_size: elem.size,
            })?;
        Ok(Self {
            elem,
            capacity,
            ring: vec![0; bytes],
            head: 0,
            len: 0,
            closed: false,
            senders: VecDeque::new(),
            receivers: VecDeque::new(),
        })
    }

    pub fn elem(&self) -> ElemLayout {
        self.elem
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn alloc_hint(&self) -> AllocHint {
        self.elem.alloc_hint()
    }

    fn slot_mut(&mut self, i: usize) -> &mut [u8] {
        let size = self.elem.size;
        if size == 0 {
            return &mut [];
        }
        let at = ((self.head + i) % self.capacity) * size;
        &mut self.ring[at..at + size]
    }

    fn push_back(&mut self, value: &[u8]) {
        debug_assert!(self.len < self.capacity, "channel buffer overflow");
        let tail = self.len;
        write_value(self.slot_mut(tail), value);
        self.len += 1;
    }

    fn pop_front(&mut self, out: &mut [u8]) {
        debug_assert!(self.len > 0, "channel buffer underflow");
        write_value(out, self.slot_mut(0));
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
    }

    fn wait_list(&mut self, dir: Direction) -> &mut VecDeque<Waiter> {
        match dir {
            Direction::Send => &mut self.senders,
            Direction::Recv => &mut self.receivers,
        }
    }

    fn remove_waiters(&mut self, task: TaskId) {
        self.senders.retain(|w| w.task != task);
        self.receivers.retain(|w| w.task != task);
    }

    #[cfg(test)]
    pub fn waiting(&self, dir: Direction) -> usize {
        match dir {
            Direction::Send => self.senders.len(),
            Direction::Recv => self.receivers.len(),
        }
    }
}

/// Copy as much of `src` as fits. Zero-sized transfers touch nothing.
pub(crate) fn write_value(dst: &mut [u8], src: &[u8]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}

impl Core {
    pub fn make_chan(&mut self, elem: ElemLayout, capacity: usize) -> Result<ChanId, ChannelError> {
        let chan = Channel::new(elem, capacity, self.config.max_channel_bytes)?;
        log::debug!(
            "make chan: elem size {} cap {} ({:?})",
            elem.size,
            capacity,
            chan.alloc_hint()
        );
        Ok(ChanId(self.channels.insert(chan)))
    }

    pub fn channel(&self, id: ChanId) -> Result<&Channel, ChannelError> {
        self.channels.get(id.0).ok_or(ChannelError::UnknownChannel)
    }

    fn channel_mut(&mut self, id: ChanId) -> Result<&mut Channel, ChannelError> {
        self.channels.get_mut(id.0).ok_or(ChannelError::UnknownChannel)
    }

    /// Send without blocking. `Ok(false)` means the caller would have to
    /// park: no receiver is waiting and the buffer is full.
    pub fn try_send(&mut self, id: ChanId, value: &[u8]) -> Result<bool, ChannelError> {
        if self.channel(id)?.closed {
            return Err(ChannelError::SendOnClosed);
        }
        if let Some(w) = self.pop_waiter(id, Direction::Recv)? {
            log::trace!("chan send: hand-off to {}", w.task);
            self.complete_park(
                w.task,
                Wakeup::Received {
                    branch: w.branch,
                    value: value.to_vec(),
                    ok: true,
                },
            );
            return Ok(true);
        }
        let chan = self.channel_mut(id)?;
        if chan.len < chan.capacity {
            chan.push_back(value);
            return Ok(true);
        }
        Ok(false)
    }

    /// Receive without blocking. `None` means the caller would have to
    /// park. `Some(false)` is a closed, drained channel; `out` is zeroed.
    pub fn try_recv(&mut self, id: ChanId, out: &mut [u8]) -> Result<Option<bool>, ChannelError> {
        let chan = self.channel_mut(id)?;
        if chan.len > 0 {
            chan.pop_front(out);
            // Refill the freed tail slot from the oldest parked sender.
            if let Some(w) = self.pop_waiter(id, Direction::Send)? {
                self.channel_mut(id)?.push_back(&w.value);
                self.complete_park(w.task, Wakeup::Sent { branch: w.branch });
            }
            return Ok(Some(true));
        }
        if let Some(w) = self.pop_waiter(id, Direction::Send)? {
            log::trace!("chan recv: hand-off from {}", w.task);
            write_value(out, &w.value);
            self.complete_park(w.task, Wakeup::Sent { branch: w.branch });
            return Ok(Some(true));
        }
        let chan = self.channel(id)?;
        if chan.closed {
            let n = chan.elem.size.min(out.len());
            out[..n].fill(0);
            return Ok(Some(false));
        }
        Ok(None)
    }

    pub fn close(&mut self, id: ChanId) -> Result<(), ChannelError> {
        let chan = self.channel_mut(id)?;
        if chan.closed {
            return Err(ChannelError::CloseOfClosed);
        }
        chan.closed = true;
        let zero = vec![0; chan.elem.size];
        log::debug!(
            "close chan: waking {} receivers, {} senders",
            chan.receivers.len(),
            chan.senders.len()
        );

        // Each completion may remove further entries from this channel, so
        // the lists are re-read on every step.
        while let Some(w) = self.pop_waiter(id, Direction::Recv)? {
            self.complete_park(
                w.task,
                Wakeup::Received {
                    branch: w.branch,
                    value: zero.clone(),
                    ok: false,
                },
            );
        }
        while let Some(w) = self.pop_waiter(id, Direction::Send)? {
            self.complete_park(w.task, Wakeup::Closed);
        }
        Ok(())
    }

    /// Oldest waiter of `dir` whose task is still waiting to be admitted.
    /// Entries left behind by tasks that are gone are discarded.
    fn pop_waiter(&mut self, id: ChanId, dir: Direction) -> Result<Option<Waiter>, ChannelError> {
        loop {
            let Some(w) = self.channel_mut(id)?.wait_list(dir).pop_front() else {
                return Ok(None);
            };
            if self.tasks.awaiting_wakeup(w.task) {
                return Ok(Some(w));
            }
            log::trace!("dropping stale {} waiter {}", dir, w.task);
        }
    }

    /// Put `task` on one wait list of `id`. The task must be suspended by
    /// the caller right after its last registration.
    pub fn park_on(
        &mut self,
        task: TaskId,
        id: ChanId,
        dir: Direction,
        branch: usize,
        value: Box<[u8]>,
    ) -> Result<(), ChannelError> {
        self.channel_mut(id)?
            .wait_list(dir)
            .push_back(Waiter { task, branch, value });
        let t = &mut self.tasks[task];
        t.state = TaskState::Blocked;
        t.park
            .get_or_insert_with(Park::default)
            .registrations
            .push((id, dir));
        log::debug!("park {} on {} (branch {})", task, dir, branch);
        Ok(())
    }

    /// Admit a parked task: drop it from every wait list it is still on,
    /// record how it finished, and make it runnable.
    pub(crate) fn complete_park(&mut self, task: TaskId, outcome: Wakeup) {
        let Some(park) = self.tasks.get_mut(task).and_then(|t| t.park.as_mut()) else {
            return;
        };
        debug_assert!(park.outcome.is_none(), "{} admitted twice", task);
        park.outcome = Some(outcome);
        let registrations = std::mem::take(&mut park.registrations);
        self.deregister(task, registrations);
        log::debug!("unpark {}", task);
        self.run_queue.push(&mut self.tasks, task);
    }

    /// Forget the park record of a task that stopped waiting before it was
    /// admitted. No-op once the outcome has been collected.
    pub(crate) fn abandon_park(&mut self, task: TaskId) {
        let Some(t) = self.tasks.get_mut(task) else {
            return;
        };
        let Some(park) = t.park.take() else {
            return;
        };
        // An admitted task is already back on the run queue.
        if self.current == Some(task) && park.outcome.is_none() {
            t.state = TaskState::Running;
        }
        log::debug!("abandon park of {}", task);
        self.deregister(task, park.registrations);
    }

    pub(crate) fn deregister(&mut self, task: TaskId, registrations: Vec<(ChanId, Direction)>) {
        for (chan, _) in registrations {
            if let Some(c) = self.channels.get_mut(chan.0) {
                c.remove_waiters(task);
            }
        }
    }

    /// Collect the outcome of a finished park, clearing the record.
    pub(crate) fn take_outcome(&mut self, task: TaskId) -> Option<Wakeup> {
        let t = self.tasks.get_mut(task)?;
        if t.park.as_ref()?.outcome.is_none() {
            return None;
        }
        t.park.take()?.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;

    fn core() -> Core {
        Core::new(SchedulerConfig::default())
    }

    fn int() -> ElemLayout {
        ElemLayout::plain(8)
    }

    fn val(v: i64) -> [u8; 8] {
        v.to_ne_bytes()
    }

    fn spawn(core: &mut Core) -> TaskId {
        core.tasks.insert(Box::pin(std::future::ready(())))
    }

    #[test]
    fn bounds_checked_before_allocation() {
        let err = Channel::new(int(), usize::MAX / 4, usize::MAX).unwrap_err();
        assert!(matches!(err, ChannelError::CapacityOutOfRange { .. }));
        assert!(Channel::new(int(), 4, 31).is_err());
        assert!(Channel::new(int(), 4, 32).is_ok());
        // Zero-sized elements never need storage.
        assert!(Channel::new(ElemLayout::ZERO_SIZED, usize::MAX, 0).is_ok());
    }

    #[test]
    fn buffered_fifo_and_occupancy() {
        let mut core = core();
        let ch = core.make_chan(int(), 2).unwrap();
        assert!(core.try_send(ch, &val(1)).unwrap());
        assert!(core.try_send(ch, &val(2)).unwrap());
        assert!(!core.try_send(ch, &val(3)).unwrap());
        assert_eq!(core.channel(ch).unwrap().len(), 2);

        let mut out = [0u8; 8];
        assert_eq!(core.try_recv(ch, &mut out).unwrap(), Some(true));
        assert_eq!(out, val(1));
        assert!(core.try_send(ch, &val(3)).unwrap());
        for want in [2, 3] {
            assert_eq!(core.try_recv(ch, &mut out).unwrap(), Some(true));
            assert_eq!(out, val(want));
        }
        assert_eq!(core.try_recv(ch, &mut out).unwrap(), None);
        assert_eq!(core.channel(ch).unwrap().len(), 0);
    }

    #[test]
    fn unbuffered_needs_a_partner() {
        let mut core = core();
        let ch = core.make_chan(int(), 0).unwrap();
        assert!(!core.try_send(ch, &val(1)).unwrap());
        let mut out = [0u8; 8];
        assert_eq!(core.try_recv(ch, &mut out).unwrap(), None);
    }

    #[test]
    fn parked_sender_hands_off() {
        let mut core = core();
        let ch = core.make_chan(int(), 0).unwrap();
        let t = spawn(&mut core);
        core.park_on(t, ch, Direction::Send, 0, Box::new(val(42)))
            .unwrap();
        assert_eq!(core.tasks[t].state, TaskState::Blocked);

        let mut out = [0u8; 8];
        assert_eq!(core.try_recv(ch, &mut out).unwrap(), Some(true));
        assert_eq!(out, val(42));
        assert_eq!(core.tasks[t].state, TaskState::Ready);
        assert!(matches!(
            core.take_outcome(t),
            Some(Wakeup::Sent { branch: 0 })
        ));
        assert!(core.tasks[t].park.is_none());
    }

    #[test]
    fn parked_sender_refills_buffer_in_order() {
        let mut core = core();
        let ch = core.make_chan(int(), 1).unwrap();
        assert!(core.try_send(ch, &val(1)).unwrap());
        let t = spawn(&mut core);
        core.park_on(t, ch, Direction::Send, 0, Box::new(val(2)))
            .unwrap();

        let mut out = [0u8; 8];
        core.try_recv(ch, &mut out).unwrap();
        assert_eq!(out, val(1));
        assert_eq!(core.channel(ch).unwrap().len(), 1);
        core.try_recv(ch, &mut out).unwrap();
        assert_eq!(out, val(2));
    }

    #[test]
    fn admission_clears_every_registration() {
        let mut core = core();
        let a = core.make_chan(int(), 0).unwrap();
        let b = core.make_chan(int(), 0).unwrap();
        let t = spawn(&mut core);
        core.park_on(t, a, Direction::Recv, 0, Box::default()).unwrap();
        core.park_on(t, b, Direction::Recv, 1, Box::default()).unwrap();

        assert!(core.try_send(b, &val(7)).unwrap());
        assert_eq!(core.channel(a).unwrap().waiting(Direction::Recv), 0);
        assert_eq!(core.channel(b).unwrap().waiting(Direction::Recv), 0);
        match core.take_outcome(t) {
            Some(Wakeup::Received { branch, value, ok }) => {
                assert_eq!(branch, 1);
                assert_eq!(value, val(7));
                assert!(ok);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // Nobody left to take this one.
        assert!(!core.try_send(a, &val(8)).unwrap());
    }

    #[test]
    fn waiters_of_vanished_tasks_are_skipped() {
        let mut core = core();
        let ch = core.make_chan(int(), 0).unwrap();
        let gone = spawn(&mut core);
        core.park_on(gone, ch, Direction::Recv, 0, Box::default()).unwrap();
        core.tasks.remove(gone);

        assert!(!core.try_send(ch, &val(42)).unwrap());
        assert_eq!(core.channel(ch).unwrap().waiting(Direction::Recv), 0);
        assert_eq!(core.run_queue.len(), 0);
    }

    #[test]
    fn abandoned_park_is_deregistered() {
        let mut core = core();
        let a = core.make_chan(int(), 0).unwrap();
        let b = core.make_chan(int(), 0).unwrap();
        let t = spawn(&mut core);
        core.park_on(t, a, Direction::Recv, 0, Box::default()).unwrap();
        core.park_on(t, b, Direction::Send, 1, Box::new(val(3))).unwrap();
        core.abandon_park(t);

        assert!(core.tasks[t].park.is_none());
        assert_eq!(core.channel(a).unwrap().waiting(Direction::Recv), 0);
        assert_eq!(core.channel(b).unwrap().waiting(Direction::Send), 0);
        let mut out = [0u8; 8];
        assert_eq!(core.try_recv(b, &mut out).unwrap(), None);
        // Nothing left to abandon.
        core.abandon_park(t);
    }

    #[test]
    fn close_drains_then_reports_closed() {
        let mut core = core();
        let ch = core.make_chan(int(), 2).unwrap();
        core.try_send(ch, &val(1)).unwrap();
        core.try_send(ch, &val(2)).unwrap();
        core.close(ch).unwrap();
        assert_eq!(core.close(ch), Err(ChannelError::CloseOfClosed));
        assert_eq!(core.try_send(ch, &val(3)), Err(ChannelError::SendOnClosed));

        let mut out = [0u8; 8];
        assert_eq!(core.try_recv(ch, &mut out).unwrap(), Some(true));
        assert_eq!(out, val(1));
        assert_eq!(core.try_recv(ch, &mut out).unwrap(), Some(true));
        assert_eq!(out, val(2));
        for _ in 0..3 {
            assert_eq!(core.try_recv(ch, &mut out).unwrap(), Some(false));
            assert_eq!(out, [0; 8]);
        }
    }

    #[test]
    fn close_wakes_everyone() {
        let mut core = core();
        let ch = core.make_chan(int(), 0).unwrap();
        let r = spawn(&mut core);
        let s = spawn(&mut core);
        core.park_on(r, ch, Direction::Recv, 0, Box::default()).unwrap();
        core.park_on(s, ch, Direction::Send, 0, Box::new(val(5)))
            .unwrap();
        core.close(ch).unwrap();

        assert!(matches!(
            core.take_outcome(r),
            Some(Wakeup::Received { ok: false, .. })
        ));
        assert!(matches!(core.take_outcome(s), Some(Wakeup::Closed)));
        assert_eq!(core.run_queue.len(), 2);
    }

    #[test]
    fn zero_sized_elements() {
        let mut core = core();
        let ch = core.make_chan(ElemLayout::ZERO_SIZED, 3).unwrap();
        for _ in 0..3 {
            assert!(core.try_send(ch, &[]).unwrap());
        }
        assert!(!core.try_send(ch, &[]).unwrap());
        assert_eq!(core.try_recv(ch, &mut []).unwrap(), Some(true));
        assert_eq!(core.channel(ch).unwrap().len(), 2);
    }

    #[test]
    fn unknown_channel() {
        let mut core = core();
        let ch = core.make_chan(int(), 1).unwrap();
        core.channels.remove(ch.0);
        assert_eq!(core.close(ch), Err(ChannelError::UnknownChannel));
        assert_eq!(core.try_send(ch, &val(1)), Err(ChannelError::UnknownChannel));
    }
}
