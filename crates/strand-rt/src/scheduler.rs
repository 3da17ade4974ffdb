// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative scheduler.
//!
//! One `Runtime` owns every task, channel and queue. Tasks reach it through
//! a cloned `Handle`. Each loop iteration does at most one of: wake the
//! sleep-queue head, fire a timer, run one task. When nothing is runnable it
//! idles on the clock for the shortest remaining sleep or timer, waits for
//! an external event, or reports a deadlock.
//!
//! The core sits in a `RefCell` and is never borrowed across a task poll or
//! a timer callback, so both may call back into the handle freely.

use std::cell::RefCell;
use std::convert::Infallible;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use generational_arena::Arena;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::channel::{write_value, ChanId, Channel};
use crate::clock::{duration_to_ticks, Clock, MonotonicClock, Ticks};
use crate::config::SchedulerConfig;
use crate::error::{ChannelError, RuntimeError};
use crate::event::{External, Notifier, TaskWaker};
use crate::op::{ChannelOp, Direction, ElemLayout, OpData};
use crate::queue::RunQueue;
use crate::sleep::SleepQueue;
use crate::task::{pause, TaskArena, TaskId, TaskState, Wakeup};
use crate::timer::{TimerHandle, TimerId};

/// Lifecycle of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, `block_on` not called yet.
    Init,
    /// Inside `block_on`.
    Running,
    /// `block_on` returned (entry task done, or deadlock).
    Exited,
}

/// Everything the scheduler mutates from its own thread.
#[derive(Debug)]
pub(crate) struct Core {
    pub tasks: TaskArena,
    pub run_queue: RunQueue,
    pub sleep_queue: SleepQueue,
    pub channels: Arena<Channel>,
    pub current: Option<TaskId>,
    pub rng: SmallRng,
    pub config: SchedulerConfig,
    pub state: SchedulerState,
}

impl Core {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            tasks: TaskArena::new(),
            run_queue: RunQueue::new(),
            sleep_queue: SleepQueue::new(),
            channels: Arena::new(),
            current: None,
            rng: SmallRng::seed_from_u64(config.select_seed),
            config,
            state: SchedulerState::Init,
        }
    }

    pub fn spawn(&mut self, future: crate::task::BoxFuture) -> TaskId {
        let id = self.tasks.insert(future);
        self.run_queue.push(&mut self.tasks, id);
        id
    }

    /// Resume a task posted from outside. Only tasks blocked on nothing but
    /// an external event are eligible.
    fn resume_external(&mut self, id: TaskId) {
        let eligible = self
            .tasks
            .get(id)
            .is_some_and(|t| t.state == TaskState::Blocked && !t.queued && t.park.is_none());
        if eligible {
            log::trace!("resume (external): {}", id);
            self.run_queue.push(&mut self.tasks, id);
        }
    }
}

struct Shared {
    core: RefCell<Core>,
    external: Arc<External>,
    clock: Box<dyn Clock>,
}

/// Owns the scheduler. Dropping it drops every task that is still alive.
pub struct Runtime {
    handle: Handle,
}

impl Runtime {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }

    pub fn with_clock(config: SchedulerConfig, clock: impl Clock + 'static) -> Self {
        let shared = Shared {
            core: RefCell::new(Core::new(config)),
            external: External::new(),
            clock: Box::new(clock),
        };
        Self {
            handle: Handle {
                shared: Rc::new(shared),
            },
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn state(&self) -> SchedulerState {
        self.handle.core(|c| c.state)
    }

    /// Run `future` as the entry task until it completes.
    ///
    /// Other tasks still alive at that point are left where they are and
    /// continue on the next `block_on`. Fails with `Deadlock` when nothing
    /// can ever run again.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output, RuntimeError>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let out = Rc::new(RefCell::new(None));
        let slot = out.clone();
        self.handle.spawn(async move {
            let value = future.await;
            *slot.borrow_mut() = Some(value);
        });

        self.handle.core(|c| c.state = SchedulerState::Running);
        let result = self.run_until(|| out.borrow_mut().take());
        self.handle.core(|c| c.state = SchedulerState::Exited);
        result
    }

    fn run_until<T>(&self, mut done: impl FnMut() -> Option<T>) -> Result<T, RuntimeError> {
        let shared = &self.handle.shared;
        loop {
            if let Some(value) = done() {
                return Ok(value);
            }
            self.drain_events();

            let now = shared.clock.now();
            self.handle.core(|c| {
                if let Some(id) = c.sleep_queue.pop_expired(&mut c.tasks, now) {
                    log::trace!("awake: {}", id);
                    c.run_queue.push(&mut c.tasks, id);
                }
            });

            if let Some((node, delay)) = shared.external.timers.with(|q| q.pop_expired(now)) {
                log::trace!("timer {:?} fired (delay {})", node.id, delay);
                (node.callback)(&self.handle, delay);
                continue;
            }

            let next = self.handle.core(|c| {
                let id = c.run_queue.pop(&mut c.tasks)?;
                Some((id, c.run_queue.len()))
            });
            if let Some((id, ready)) = next {
                log::trace!("run: {} ({} more ready)", id, ready);
                self.run_task(id);
                continue;
            }

            let sleep_left = self.handle.core(|c| c.sleep_queue.time_left(&c.tasks, now));
            let timer_left = shared.external.timers.with(|q| q.time_left(now));
            let idle = match (sleep_left, timer_left) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            match idle {
                Some(0) => {}
                Some(ticks) => {
                    log::trace!("sleeping for {} ticks", ticks);
                    shared.clock.idle(ticks);
                }
                None if shared.external.has_pending() => {}
                None => {
                    // Our own reference is the only one: nobody outside the
                    // runtime can post an event any more.
                    let orphaned = Arc::strong_count(&shared.external) <= 1;
                    if self.handle.core(|c| c.config.return_at_deadlock) || orphaned {
                        let parked = self.handle.core(|c| {
                            debug_assert!(c.run_queue.is_empty() && c.sleep_queue.is_empty());
                            c.tasks.len()
                        });
                        log::debug!("deadlock: {} tasks parked", parked);
                        return Err(RuntimeError::Deadlock { parked });
                    }
                    log::trace!("waiting for external event");
                    shared.external.wait();
                }
            }
        }
    }

    fn drain_events(&self) {
        let posted = self.handle.shared.external.take_pending();
        if posted.is_empty() {
            return;
        }
        self.handle.core(|c| {
            for id in posted {
                c.resume_external(id);
            }
        });
    }

    fn run_task(&self, id: TaskId) {
        let future = self.handle.core(|c| {
            let task = c.tasks.get_mut(id)?;
            task.state = TaskState::Running;
            let future = task.future.take();
            c.current = Some(id);
            future
        });
        let Some(mut future) = future else {
            return;
        };

        let waker = Waker::from(Arc::new(TaskWaker {
            task: id,
            external: self.handle.shared.external.clone(),
        }));
        let poll = future.as_mut().poll(&mut Context::from_waker(&waker));

        // The future may hold task-local state whose drop re-enters the
        // handle, so it is dropped after the core is released.
        let finished = self.handle.core(|c| {
            c.current = None;
            match poll {
                Poll::Ready(()) => {
                    if let Some(park) = c.tasks.remove(id).and_then(|t| t.park) {
                        c.deregister(id, park.registrations);
                    }
                    log::trace!("exit: {}", id);
                    Some(future)
                }
                Poll::Pending => {
                    if let Some(task) = c.tasks.get_mut(id) {
                        task.future = Some(future);
                        if task.state == TaskState::Running {
                            task.state = TaskState::Blocked;
                        }
                    }
                    None
                }
            }
        });
        drop(finished);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Tasks hold handles, which hold the core: break the cycle.
        let Ok(mut core) = self.handle.shared.core.try_borrow_mut() else {
            return;
        };
        let tasks = std::mem::replace(&mut core.tasks, TaskArena::new());
        drop(core);
        drop(tasks);
    }
}

/// Releases the park record of a task whose wait was cut short.
struct ParkGuard<'h> {
    handle: &'h Handle,
    task: TaskId,
}

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        // Task futures are also dropped while the runtime itself is torn down.
        if let Ok(mut core) = self.handle.shared.core.try_borrow_mut() {
            core.abandon_park(self.task);
        }
    }
}

/// What tasks use to talk to their runtime. Cheap to clone, not `Send`.
#[derive(Clone)]
pub struct Handle {
    shared: Rc<Shared>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

impl Handle {
    pub(crate) fn core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        f(&mut self.shared.core.borrow_mut())
    }

    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) -> TaskId {
        let id = self.core(|c| c.spawn(Box::pin(future)));
        log::trace!("spawn: {}", id);
        id
    }

    /// The task being polled, if any.
    pub fn current(&self) -> Option<TaskId> {
        self.core(|c| c.current)
    }

    pub fn task_state(&self, id: TaskId) -> Result<TaskState, RuntimeError> {
        self.core(|c| c.tasks.get(id).map(|t| t.state))
            .ok_or(RuntimeError::UnknownTask)
    }

    pub fn now(&self) -> Ticks {
        self.shared.clock.now()
    }

    pub fn make_chan(&self, elem: ElemLayout, capacity: usize) -> Result<ChanId, ChannelError> {
        self.core(|c| c.make_chan(elem, capacity))
    }

    pub fn len(&self, chan: ChanId) -> Result<usize, ChannelError> {
        self.core(|c| c.channel(chan).map(Channel::len))
    }

    pub fn cap(&self, chan: ChanId) -> Result<usize, ChannelError> {
        self.core(|c| c.channel(chan).map(Channel::capacity))
    }

    pub fn is_closed(&self, chan: ChanId) -> Result<bool, ChannelError> {
        self.core(|c| c.channel(chan).map(Channel::is_closed))
    }

    pub fn elem_layout(&self, chan: ChanId) -> Result<ElemLayout, ChannelError> {
        self.core(|c| c.channel(chan).map(Channel::elem))
    }

    pub fn try_send(&self, chan: ChanId, value: &[u8]) -> Result<bool, ChannelError> {
        self.core(|c| c.try_send(chan, value))
    }

    pub fn try_recv(&self, chan: ChanId, out: &mut [u8]) -> Result<Option<bool>, ChannelError> {
        self.core(|c| c.try_recv(chan, out))
    }

    pub fn close(&self, chan: ChanId) -> Result<(), ChannelError> {
        self.core(|c| c.close(chan))
    }

    /// Send, blocking until the value is buffered or taken by a receiver.
    pub async fn send(&self, op: ChannelOp<'_>) -> Result<(), RuntimeError> {
        let OpData::Send(value) = op.data else {
            return Err(ChannelError::DirectionMismatch {
                expected: Direction::Send,
            }
            .into());
        };
        if self.try_send(op.chan, value)? {
            return Ok(());
        }
        let task = self.current().ok_or(RuntimeError::NotInTask)?;
        self.core(|c| c.park_on(task, op.chan, Direction::Send, 0, value.into()))?;
        match self.wait_outcome(task).await {
            Wakeup::Closed => Err(ChannelError::SendOnClosed.into()),
            _ => Ok(()),
        }
    }

    /// Receive into the descriptor's buffer. Returns false once the channel
    /// is closed and drained, with the buffer zeroed.
    pub async fn recv(&self, op: ChannelOp<'_>) -> Result<bool, RuntimeError> {
        let OpData::Recv(out) = op.data else {
            return Err(ChannelError::DirectionMismatch {
                expected: Direction::Recv,
            }
            .into());
        };
        if let Some(ok) = self.try_recv(op.chan, out)? {
            return Ok(ok);
        }
        let task = self.current().ok_or(RuntimeError::NotInTask)?;
        self.core(|c| c.park_on(task, op.chan, Direction::Recv, 0, Box::default()))?;
        match self.wait_outcome(task).await {
            Wakeup::Received { value, ok, .. } => {
                write_value(out, &value);
                Ok(ok)
            }
            _ => Ok(false),
        }
    }

    /// Suspend until some operation admits the parked task. Dropping the
    /// future first takes the task off every wait list it is still on.
    pub(crate) async fn wait_outcome(&self, task: TaskId) -> Wakeup {
        let _guard = ParkGuard { handle: self, task };
        loop {
            pause().await;
            if let Some(outcome) = self.core(|c| c.take_outcome(task)) {
                return outcome;
            }
        }
    }

    /// Let every other ready task run once before continuing.
    pub async fn yield_now(&self) {
        let Some(task) = self.current() else {
            log::warn!("yield_now outside of a task");
            return;
        };
        self.core(|c| c.run_queue.push(&mut c.tasks, task));
        pause().await;
    }

    pub async fn sleep(&self, duration: Duration) {
        self.sleep_ticks(duration_to_ticks(duration)).await;
    }

    /// Sleep for at least `ticks`. Zero returns at once.
    pub async fn sleep_ticks(&self, ticks: Ticks) {
        if ticks == 0 {
            return;
        }
        let Some(task) = self.current() else {
            log::warn!("sleep outside of a task");
            return;
        };
        let now = self.now();
        self.core(|c| c.sleep_queue.insert(&mut c.tasks, task, ticks, now));
        pause().await;
    }

    /// Block the current task until a `Notifier` resumes it.
    pub async fn wait_for_event(&self) {
        if self.current().is_none() {
            log::warn!("wait_for_event outside of a task");
            return;
        }
        // Left `Blocked` by the scheduler after this poll.
        pause().await;
    }

    /// Park the current task forever. The scheduler reports the deadlock
    /// once nothing else can run.
    pub async fn deadlock(&self) -> Infallible {
        log::debug!("deadlock: parking {:?} forever", self.current());
        loop {
            pause().await;
        }
    }

    pub fn notifier(&self) -> Notifier {
        Notifier {
            external: self.shared.external.clone(),
        }
    }

    pub fn timer_handle(&self) -> TimerHandle {
        TimerHandle {
            external: self.shared.external.clone(),
        }
    }

    /// Arm a timer at absolute tick `when`.
    pub fn add_timer(
        &self,
        when: Ticks,
        callback: impl FnOnce(&Handle, Ticks) + Send + 'static,
    ) -> TimerId {
        self.shared
            .external
            .timers
            .with(|q| q.add(when, Box::new(callback)))
    }

    pub fn remove_timer(&self, id: TimerId) -> bool {
        self.shared.external.timers.with(|q| q.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;

    fn runtime() -> (Runtime, ManualClock) {
        let clock = ManualClock::new();
        (
            Runtime::with_clock(SchedulerConfig::default(), clock.clone()),
            clock,
        )
    }

    #[test]
    fn entry_value_is_returned() {
        let (rt, _) = runtime();
        assert_eq!(rt.state(), SchedulerState::Init);
        assert_eq!(rt.block_on(async { 7 }), Ok(7));
        assert_eq!(rt.state(), SchedulerState::Exited);
    }

    #[test]
    fn run_queue_is_fifo() {
        let (rt, _) = runtime();
        let h = rt.handle().clone();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        rt.block_on(async move {
            for i in 0..3 {
                let l = l.clone();
                h.spawn(async move { l.borrow_mut().push(i) });
            }
            h.yield_now().await;
            l.borrow_mut().push(99);
        })
        .unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 99]);
    }

    #[test]
    fn sleep_advances_virtual_time() {
        let (rt, clock) = runtime();
        let h = rt.handle().clone();
        rt.block_on(async move {
            h.sleep_ticks(500).await;
            h.sleep_ticks(0).await;
        })
        .unwrap();
        assert_eq!(clock.now(), 500);
    }

    #[test]
    fn current_is_set_while_polling() {
        let (rt, _) = runtime();
        let h = rt.handle().clone();
        assert_eq!(h.current(), None);
        let seen = rt
            .block_on({
                let h = h.clone();
                async move { h.current() }
            })
            .unwrap();
        assert!(seen.is_some());
        assert_eq!(h.current(), None);
    }

    #[test]
    fn nothing_runnable_is_a_deadlock() {
        let (rt, _) = runtime();
        let h = rt.handle().clone();
        let ch = h.make_chan(ElemLayout::plain(4), 0).unwrap();
        let err = rt
            .block_on(async move {
                let mut buf = [0u8; 4];
                h.recv(ChannelOp::recv(ch, &mut buf)).await
            })
            .unwrap_err();
        assert_eq!(err, RuntimeError::Deadlock { parked: 1 });
    }

    #[test]
    fn foreign_waker_resumes_task() {
        struct Later(Rc<Cell<Option<Waker>>>, bool);
        impl Future for Later {
            type Output = ();
            fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                if self.1 {
                    return Poll::Ready(());
                }
                self.1 = true;
                self.0.set(Some(cx.waker().clone()));
                Poll::Pending
            }
        }

        let (rt, _) = runtime();
        let h = rt.handle().clone();
        let stash = Rc::new(Cell::new(None::<Waker>));
        let s = stash.clone();
        rt.block_on(async move {
            let s2 = s.clone();
            h.spawn(async move {
                if let Some(w) = s2.take() {
                    w.wake();
                }
            });
            Later(s, false).await;
        })
        .unwrap();
    }

    #[test]
    fn timers_fire_in_the_loop() {
        let (rt, clock) = runtime();
        let h = rt.handle().clone();
        let fired = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let f = fired.clone();
        h.add_timer(100, move |_, delay| {
            f.store(delay + 1, std::sync::atomic::Ordering::SeqCst);
        });
        let h2 = h.clone();
        rt.block_on(async move { h2.sleep_ticks(150).await }).unwrap();
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(clock.now(), 150);
    }
}
