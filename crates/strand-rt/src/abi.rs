// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Entry points called by lowered code.
//!
//! Thin wrappers over `Handle` that turn every contract violation into a
//! fatal `runtime_panic`. Lowered code never sees an error value: a receive
//! reports closure through its `ok` flag and everything else either
//! succeeds or does not return.
//!
//! The symbol names are shared with the lowering pass.

use std::convert::Infallible;
use std::future::Future;

use crate::channel::ChanId;
use crate::error::{runtime_panic, ChannelError};
use crate::op::{ChannelOp, ElemLayout, SelectCase, SelectOutcome};
use crate::scheduler::{Handle, Runtime};

pub const CHAN_MAKE: &str = "rt_chan_make";
pub const CHAN_MAKE_PANIC: &str = "rt_chan_make_panic";
pub const CHAN_SEND: &str = "rt_chan_send";
pub const CHAN_RECV: &str = "rt_chan_recv";
pub const CHAN_CLOSE: &str = "rt_chan_close";
pub const CHAN_SELECT: &str = "rt_chan_select";
pub const DEADLOCK: &str = "rt_deadlock";

/// Every entry point, in declaration order.
pub const ENTRY_POINTS: [&str; 7] = [
    CHAN_MAKE,
    CHAN_MAKE_PANIC,
    CHAN_SEND,
    CHAN_RECV,
    CHAN_CLOSE,
    CHAN_SELECT,
    DEADLOCK,
];

fn fatal<T, E: std::fmt::Display>(r: Result<T, E>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => runtime_panic(e),
    }
}

pub fn chan_make(h: &Handle, elem_size: usize, capacity: usize, no_pointers: bool) -> ChanId {
    let layout = ElemLayout {
        has_pointers: !no_pointers,
        ..ElemLayout::plain(elem_size)
    };
    fatal(h.make_chan(layout, capacity))
}

/// Target of the inline size check emitted in front of `chan_make`.
pub fn chan_make_panic() -> ! {
    runtime_panic(ChannelError::SizeCheckFailed)
}

pub async fn chan_send(h: &Handle, op: ChannelOp<'_>) {
    fatal(h.send(op).await)
}

pub async fn chan_recv(h: &Handle, op: ChannelOp<'_>) -> bool {
    fatal(h.recv(op).await)
}

pub fn chan_close(h: &Handle, chan: ChanId) {
    fatal(h.close(chan))
}

/// Lowered selects read `index` as a signed native int: the not-ready
/// sentinel shows up as -1.
pub async fn chan_select(
    h: &Handle,
    recvbuf: &mut [u8],
    cases: &[SelectCase<'_>],
    blocking: bool,
) -> SelectOutcome {
    fatal(h.select(recvbuf, cases, blocking).await)
}

pub async fn deadlock(h: &Handle) -> Infallible {
    h.deadlock().await
}

/// Run the program's entry task. A deadlock is fatal.
pub fn run<F>(rt: &Runtime, main: F) -> F::Output
where
    F: Future + 'static,
    F::Output: 'static,
{
    fatal(rt.block_on(main))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SchedulerConfig;

    fn runtime() -> Runtime {
        Runtime::with_clock(SchedulerConfig::default(), ManualClock::new())
    }

    #[test]
    fn names_are_unique() {
        let mut names = ENTRY_POINTS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ENTRY_POINTS.len());
    }

    #[test]
    fn sentinel_reads_as_minus_one() {
        assert_eq!(SelectOutcome::NOT_READY.index as isize, -1);
    }

    #[test]
    fn make_records_hint() {
        let rt = runtime();
        let h = rt.handle();
        let ch = chan_make(h, 16, 4, true);
        let layout = h.elem_layout(ch).unwrap();
        assert!(!layout.has_pointers);
        assert_eq!(layout.size, 16);
        assert_eq!(h.cap(ch), Ok(4));
    }

    #[test]
    #[should_panic(expected = "makechan: size out of range")]
    fn make_out_of_range_is_fatal() {
        let rt = runtime();
        chan_make(rt.handle(), 8, usize::MAX, true);
    }

    #[test]
    #[should_panic(expected = "makechan: size out of range")]
    fn make_panic_entry() {
        chan_make_panic();
    }

    #[test]
    #[should_panic(expected = "close of closed channel")]
    fn double_close_is_fatal() {
        let rt = runtime();
        let ch = chan_make(rt.handle(), 4, 1, true);
        chan_close(rt.handle(), ch);
        chan_close(rt.handle(), ch);
    }

    #[test]
    #[should_panic(expected = "all tasks are asleep - deadlock!")]
    fn blocking_empty_select_is_fatal() {
        let rt = runtime();
        let h = rt.handle().clone();
        run(&rt, async move {
            let mut buf = [0u8; 0];
            chan_select(&h, &mut buf, &[], true).await;
        });
    }

    #[test]
    fn non_blocking_empty_select() {
        let rt = runtime();
        let h = rt.handle().clone();
        let out = run(&rt, async move {
            let mut buf = [0u8; 0];
            chan_select(&h, &mut buf, &[], false).await
        });
        assert_eq!(out, SelectOutcome::NOT_READY);
        assert!(!out.ok);
    }
}
