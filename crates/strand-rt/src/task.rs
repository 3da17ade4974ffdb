// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tasks and the pause/resume primitive.
//!
//! A task is a boxed future living in an arena slot. The scheduler polls it
//! when it is popped from the run queue; returning `Pending` is a pause.
//! Whoever pauses a task must already have put it somewhere (run queue,
//! sleep queue, a channel wait list) or it never runs again.

use std::fmt;
use std::future::Future;
use std::ops::{Index, IndexMut};
use std::pin::Pin;
use std::task::{Context, Poll};

use generational_arena::Arena;

use crate::channel::ChanId;
use crate::op::Direction;

/// Type-erased task body. Tasks never leave the scheduler's thread.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Stable handle to a task. Stale handles (task already exited, slot reused)
/// never alias a live task thanks to the arena generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) generational_arena::Index);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, generation) = self.0.into_raw_parts();
        write!(f, "task#{}.{}", index, generation)
    }
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// On the run queue.
    Ready,
    /// Being polled right now.
    Running,
    /// Parked on channel wait lists, or waiting for an external event.
    Blocked,
    /// On the sleep queue.
    Sleeping,
}

/// How a blocked channel operation finished. Written by whichever
/// operation admitted the task, read by the task once it runs again.
#[derive(Debug)]
pub(crate) enum Wakeup {
    Sent { branch: usize },
    Received { branch: usize, value: Vec<u8>, ok: bool },
    /// The channel of a parked send was closed underneath it.
    Closed,
}

/// Park record of a task blocked on one or more channels.
#[derive(Debug, Default)]
pub(crate) struct Park {
    /// Every wait list the task sits on, one entry per select branch.
    pub registrations: Vec<(ChanId, Direction)>,
    pub outcome: Option<Wakeup>,
}

pub(crate) struct Task {
    pub state: TaskState,
    /// Queue linkage. A task is on at most one of run queue / sleep queue.
    pub next: Option<TaskId>,
    /// Scratch field: sleep delta while on the sleep queue.
    pub data: u64,
    /// True while linked into the run queue or the sleep queue.
    pub queued: bool,
    /// Taken out while the task is being polled.
    pub future: Option<BoxFuture>,
    pub park: Option<Park>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.state)
            .field("next", &self.next)
            .field("data", &self.data)
            .field("queued", &self.queued)
            .field("parked", &self.park.is_some())
            .finish()
    }
}

/// Arena of live tasks.
#[derive(Debug)]
pub(crate) struct TaskArena {
    slots: Arena<Task>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self {
            slots: Arena::new(),
        }
    }

    pub fn insert(&mut self, future: BoxFuture) -> TaskId {
        TaskId(self.slots.insert(Task {
            state: TaskState::Ready,
            next: None,
            data: 0,
            queued: false,
            future: Some(future),
            park: None,
        }))
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id.0)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        self.slots.remove(id.0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True while the task is parked on channels and no operation has
    /// admitted it yet.
    pub fn awaiting_wakeup(&self, id: TaskId) -> bool {
        self.get(id)
            .and_then(|t| t.park.as_ref())
            .is_some_and(|p| p.outcome.is_none())
    }
}

impl Index<TaskId> for TaskArena {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        &self.slots[id.0]
    }
}

impl IndexMut<TaskId> for TaskArena {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.slots[id.0]
    }
}

/// Future that gives control back to the scheduler exactly once.
#[derive(Debug)]
#[must_use = "a pause does nothing unless awaited"]
pub struct Pause {
    yielded: bool,
}

/// Suspend the running task. It is *not* re-queued; see the module docs.
pub fn pause() -> Pause {
    Pause { yielded: false }
}

impl Future for Pause {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}
