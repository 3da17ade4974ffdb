// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Scheduler configuration.

use std::str::FromStr;

/// Knobs for one `Runtime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Return `RuntimeError::Deadlock` when nothing can run. When false the
    /// scheduler blocks on the external event queue instead, as long as some
    /// `Notifier` or `TimerHandle` outside the runtime could still post work.
    pub return_at_deadlock: bool,
    /// Upper bound on `capacity * elem_size` for a single channel buffer.
    pub max_channel_bytes: usize,
    /// Seed for the select fairness RNG.
    pub select_seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            return_at_deadlock: true,
            max_channel_bytes: isize::MAX as usize,
            select_seed: 0x9E37_79B9_7F4A_7C15,
        }
    }
}

impl SchedulerConfig {
    /// Defaults overlaid with `STRAND_RETURN_AT_DEADLOCK`,
    /// `STRAND_MAX_CHANNEL_BYTES` and `STRAND_SELECT_SEED`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_value::<bool>("STRAND_RETURN_AT_DEADLOCK") {
            config.return_at_deadlock = v;
        }
        if let Some(v) = env_value::<usize>("STRAND_MAX_CHANNEL_BYTES") {
            config.max_channel_bytes = v;
        }
        if let Some(v) = env_value::<u64>("STRAND_SELECT_SEED") {
            config.select_seed = v;
        }
        config
    }

    pub fn with_return_at_deadlock(mut self, yes: bool) -> Self {
        self.return_at_deadlock = yes;
        self
    }

    pub fn with_max_channel_bytes(mut self, bytes: usize) -> Self {
        self.max_channel_bytes = bytes;
        self
    }

    pub fn with_select_seed(mut self, seed: u64) -> Self {
        self.select_seed = seed;
        self
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring malformed {}={:?}", key, raw);
            None
        }
    }
}
