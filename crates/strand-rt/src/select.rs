// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Select engine.
//!
//! Branches are tried as non-blocking operations starting at a random
//! offset, so that no branch is starved when several are ready. If none
//! succeeds a blocking select registers on every branch's wait list at once
//! and suspends; the admitting operation clears the other registrations.

use rand::Rng;

use crate::channel::write_value;
use crate::error::{ChannelError, RuntimeError};
use crate::op::{SelectCase, SelectOutcome};
use crate::scheduler::{Core, Handle};
use crate::task::{TaskId, Wakeup};

impl Core {
    /// One non-blocking pass over `cases`. A winning receive branch leaves
    /// its value at the start of `recvbuf`.
    pub fn select_try(
        &mut self,
        recvbuf: &mut [u8],
        cases: &[SelectCase<'_>],
    ) -> Result<Option<SelectOutcome>, ChannelError> {
        let n = cases.len();
        if n == 0 {
            return Ok(None);
        }
        let start = self.rng.gen_range(0..n);
        for i in (start..n).chain(0..start) {
            let case = &cases[i];
            let outcome = match case.send {
                Some(value) => self
                    .try_send(case.chan, value)?
                    .then(|| SelectOutcome::sent(i)),
                None => self
                    .try_recv(case.chan, recvbuf)?
                    .map(|ok| SelectOutcome::received_on(i, ok)),
            };
            if let Some(outcome) = outcome {
                log::debug!("select: branch {} of {} ready", i, n);
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    /// Register `task` on every branch. All channels are checked first so
    /// a bad handle leaves no partial registration behind.
    pub fn select_park(&mut self, task: TaskId, cases: &[SelectCase<'_>]) -> Result<(), ChannelError> {
        for case in cases {
            self.channel(case.chan)?;
        }
        for (i, case) in cases.iter().enumerate() {
            let value = case.send.map(Box::<[u8]>::from).unwrap_or_default();
            self.park_on(task, case.chan, case.direction(), i, value)?;
        }
        Ok(())
    }
}

impl Handle {
    /// Wait for the first of `cases` that can proceed.
    ///
    /// `recvbuf` is shared by all receive branches and must be as large as
    /// the largest of their elements; read the payload back with
    /// [`SelectOutcome::received`]. A non-blocking select that finds nothing
    /// ready returns [`SelectOutcome::NOT_READY`]. A blocking select with no
    /// branches never returns.
    pub async fn select(
        &self,
        recvbuf: &mut [u8],
        cases: &[SelectCase<'_>],
        blocking: bool,
    ) -> Result<SelectOutcome, RuntimeError> {
        if cases.is_empty() {
            if blocking {
                match self.deadlock().await {}
            }
            return Ok(SelectOutcome::NOT_READY);
        }
        if let Some(outcome) = self.core(|c| c.select_try(recvbuf, cases))? {
            return Ok(outcome);
        }
        if !blocking {
            return Ok(SelectOutcome::NOT_READY);
        }

        let task = self.current().ok_or(RuntimeError::NotInTask)?;
        self.core(|c| c.select_park(task, cases))?;
        match self.wait_outcome(task).await {
            Wakeup::Sent { branch } => {
                log::debug!("select: woken on send branch {}", branch);
                Ok(SelectOutcome::sent(branch))
            }
            Wakeup::Received { branch, value, ok } => {
                log::debug!("select: woken on recv branch {} (ok={})", branch, ok);
                write_value(recvbuf, &value);
                Ok(SelectOutcome::received_on(branch, ok))
            }
            Wakeup::Closed => Err(ChannelError::SendOnClosed.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::op::{Direction, ElemLayout};

    fn int() -> ElemLayout {
        ElemLayout::plain(8)
    }

    #[test]
    fn nothing_ready() {
        let mut core = Core::new(SchedulerConfig::default());
        let a = core.make_chan(int(), 0).unwrap();
        let b = core.make_chan(int(), 0).unwrap();
        let x = 1i64.to_ne_bytes();
        let mut buf = [0u8; 8];
        let cases = [SelectCase::recv(a), SelectCase::send(b, &x)];
        assert_eq!(core.select_try(&mut buf, &cases).unwrap(), None);
        assert_eq!(core.channel(b).unwrap().len(), 0);
    }

    #[test]
    fn ready_receive_wins() {
        let mut core = Core::new(SchedulerConfig::default());
        let a = core.make_chan(int(), 1).unwrap();
        let b = core.make_chan(int(), 0).unwrap();
        core.try_send(a, &5i64.to_ne_bytes()).unwrap();
        let mut buf = [0u8; 8];
        let cases = [SelectCase::recv(b), SelectCase::recv(a)];
        let out = core.select_try(&mut buf, &cases).unwrap().unwrap();
        assert_eq!(out.index, 1);
        assert!(out.ok);
        assert_eq!(out.direction(), Some(Direction::Recv));
        assert_eq!(out.received(&buf, 8), Some(&5i64.to_ne_bytes()[..]));
    }

    #[test]
    fn every_ready_branch_gets_picked() {
        let mut core = Core::new(SchedulerConfig::default());
        let chans: Vec<_> = (0..3).map(|_| core.make_chan(int(), 64).unwrap()).collect();
        let x = 0i64.to_ne_bytes();
        let cases: Vec<_> = chans.iter().map(|&c| SelectCase::send(c, &x)).collect();
        let mut hits = [0usize; 3];
        let mut buf = [0u8; 0];
        for _ in 0..60 {
            let out = core.select_try(&mut buf, &cases).unwrap().unwrap();
            hits[out.index] += 1;
        }
        assert!(hits.iter().all(|&h| h > 0), "{:?}", hits);
    }

    #[test]
    fn send_branch_on_closed_channel_fails() {
        let mut core = Core::new(SchedulerConfig::default());
        let a = core.make_chan(int(), 1).unwrap();
        core.close(a).unwrap();
        let x = 1i64.to_ne_bytes();
        let mut buf = [0u8; 8];
        assert_eq!(
            core.select_try(&mut buf, &[SelectCase::send(a, &x)]),
            Err(ChannelError::SendOnClosed)
        );
    }

    #[test]
    fn park_validates_before_registering() {
        let mut core = Core::new(SchedulerConfig::default());
        let a = core.make_chan(int(), 0).unwrap();
        let gone = core.make_chan(int(), 0).unwrap();
        core.channels.remove(gone.0);
        let t = core.tasks.insert(Box::pin(std::future::ready(())));
        let cases = [SelectCase::recv(a), SelectCase::recv(gone)];
        assert_eq!(
            core.select_park(t, &cases),
            Err(ChannelError::UnknownChannel)
        );
        assert!(core.tasks[t].park.is_none());
    }
}
