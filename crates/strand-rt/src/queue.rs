// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! FIFO run queue.
//!
//! Threaded through the `next` field of the task arena, so pushing and
//! popping never allocates. Tasks made ready in the same scheduler tick run
//! in the order they were pushed.

use crate::task::{TaskArena, TaskId, TaskState};

#[derive(Debug, Default)]
pub(crate) struct RunQueue {
    head: Option<TaskId>,
    tail: Option<TaskId>,
    len: usize,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. It must not be on any other queue.
    pub fn push(&mut self, tasks: &mut TaskArena, id: TaskId) {
        let task = &mut tasks[id];
        debug_assert!(!task.queued, "{} is already queued", id);
        task.queued = true;
        task.next = None;
        task.state = TaskState::Ready;

        match self.tail {
            Some(tail) => tasks[tail].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    pub fn pop(&mut self, tasks: &mut TaskArena) -> Option<TaskId> {
        let id = self.head?;
        let task = &mut tasks[id];
        self.head = task.next.take();
        task.queued = false;
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(arena: &mut TaskArena) -> TaskId {
        arena.insert(Box::pin(std::future::ready(())))
    }

    #[test]
    fn fifo_order() {
        let mut arena = TaskArena::new();
        let mut q = RunQueue::new();
        let ids: Vec<_> = (0..4).map(|_| spawn(&mut arena)).collect();
        for &id in &ids {
            q.push(&mut arena, id);
        }
        assert_eq!(q.len(), 4);
        let popped: Vec<_> = std::iter::from_fn(|| q.pop(&mut arena)).collect();
        assert_eq!(popped, ids);
        assert!(q.is_empty());
    }

    #[test]
    fn interleaved_push_pop() {
        let mut arena = TaskArena::new();
        let mut q = RunQueue::new();
        let a = spawn(&mut arena);
        let b = spawn(&mut arena);
        q.push(&mut arena, a);
        assert_eq!(q.pop(&mut arena), Some(a));
        assert!(q.is_empty());
        q.push(&mut arena, b);
        q.push(&mut arena, a);
        assert_eq!(q.pop(&mut arena), Some(b));
        assert_eq!(q.pop(&mut arena), Some(a));
        assert_eq!(q.pop(&mut arena), None);
    }

    #[test]
    fn membership_flag_tracks_queue() {
        let mut arena = TaskArena::new();
        let mut q = RunQueue::new();
        let a = spawn(&mut arena);
        q.push(&mut arena, a);
        assert!(arena[a].queued);
        q.pop(&mut arena);
        assert!(!arena[a].queued);
        assert!(arena[a].next.is_none());
    }
}
