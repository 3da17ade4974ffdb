// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Operation descriptors.
//!
//! Fixed-layout records describing one channel operation. Lowered code
//! builds them on its own stack, passes them in by reference, and reads the
//! result back out of the same storage. Nothing here owns heap memory.

use std::fmt;

use crate::channel::ChanId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Recv => write!(f, "recv"),
        }
    }
}

/// Caller-owned storage of a descriptor. Zero-sized element types use an
/// empty slice, which the runtime never reads from or writes to.
#[derive(Debug)]
pub enum OpData<'a> {
    /// Value to send.
    Send(&'a [u8]),
    /// Where the received value is written.
    Recv(&'a mut [u8]),
}

/// One channel operation: direction, channel and data location.
#[derive(Debug)]
pub struct ChannelOp<'a> {
    pub chan: ChanId,
    pub data: OpData<'a>,
}

impl<'a> ChannelOp<'a> {
    pub fn send(chan: ChanId, value: &'a [u8]) -> Self {
        Self {
            chan,
            data: OpData::Send(value),
        }
    }

    pub fn recv(chan: ChanId, buf: &'a mut [u8]) -> Self {
        Self {
            chan,
            data: OpData::Recv(buf),
        }
    }

    pub fn direction(&self) -> Direction {
        match self.data {
            OpData::Send(_) => Direction::Send,
            OpData::Recv(_) => Direction::Recv,
        }
    }
}

/// One branch of a select. Receive branches carry no storage of their own:
/// all of them share the select's receive buffer, since only one can win.
#[derive(Debug, Clone, Copy)]
pub struct SelectCase<'a> {
    pub chan: ChanId,
    pub send: Option<&'a [u8]>,
}

impl<'a> SelectCase<'a> {
    pub fn recv(chan: ChanId) -> Self {
        Self { chan, send: None }
    }

    pub fn send(chan: ChanId, value: &'a [u8]) -> Self {
        Self {
            chan,
            send: Some(value),
        }
    }

    pub fn direction(&self) -> Direction {
        if self.send.is_some() {
            Direction::Send
        } else {
            Direction::Recv
        }
    }
}

/// First half of the two-step select result: which branch committed.
///
/// The payload of a receive branch stays in the shared receive buffer until
/// the caller asks for it with [`SelectOutcome::received`], typed by the
/// branch it now knows won.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOutcome {
    /// Winning branch, or `NOT_READY` when a non-blocking select found
    /// nothing ready.
    pub index: usize,
    /// Receive branches only: false when the channel was closed and drained.
    pub ok: bool,
    committed: Option<Direction>,
}

impl SelectOutcome {
    pub const NOT_READY_INDEX: usize = usize::MAX;

    pub const NOT_READY: SelectOutcome = SelectOutcome {
        index: Self::NOT_READY_INDEX,
        ok: false,
        committed: None,
    };

    pub(crate) fn sent(index: usize) -> Self {
        Self {
            index,
            ok: false,
            committed: Some(Direction::Send),
        }
    }

    pub(crate) fn received_on(index: usize, ok: bool) -> Self {
        Self {
            index,
            ok,
            committed: Some(Direction::Recv),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.committed.is_some()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.committed
    }

    /// Second half: the received bytes of the winning receive branch,
    /// `elem_size` long. None if nothing was received.
    pub fn received<'b>(&self, recvbuf: &'b [u8], elem_size: usize) -> Option<&'b [u8]> {
        match self.committed {
            Some(Direction::Recv) => recvbuf.get(..elem_size),
            _ => None,
        }
    }
}

/// Allocation hint for channel buffers. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocHint {
    /// Elements may hold references; the collector must scan the buffer.
    Scan,
    /// Elements provably hold no references.
    NoScan,
}

/// Size, alignment and pointer-freedom of a channel's element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElemLayout {
    pub size: usize,
    pub align: usize,
    pub has_pointers: bool,
}

impl ElemLayout {
    pub const ZERO_SIZED: ElemLayout = ElemLayout {
        size: 0,
        align: 1,
        has_pointers: false,
    };

    pub fn new(size: usize, align: usize, has_pointers: bool) -> Self {
        Self {
            size,
            align,
            has_pointers,
        }
    }

    /// Layout of a pointer-free element of `size` bytes.
    pub fn plain(size: usize) -> Self {
        Self::new(size, size.clamp(1, 8).next_power_of_two(), false)
    }

    /// Layout of `T`. Conservatively assumes it may hold pointers.
    pub fn of<T>() -> Self {
        Self::new(std::mem::size_of::<T>(), std::mem::align_of::<T>(), true)
    }

    pub fn alloc_hint(&self) -> AllocHint {
        if self.has_pointers {
            AllocHint::Scan
        } else {
            AllocHint::NoScan
        }
    }
}
