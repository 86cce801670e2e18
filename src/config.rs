//! Tunables for the sync runtime.

use std::time::Duration;

use serde::Deserialize;

/// Runtime configuration.
///
/// Deserializable so hosts can embed it in their own config files; missing
/// fields fall back to [`SyncConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Period of the pending-count poll.
    pub poll_interval_ms: u64,
    /// Per remote call timeout. A timed-out call counts as a failure;
    /// 0 disables the timeout.
    pub call_timeout_ms: u64,
    /// Attempt one replay right after spawn when online.
    pub replay_on_start: bool,
    /// Let poll ticks start a replay when the backlog is nonzero.
    pub replay_on_poll: bool,
    /// Capacity of the controller command channel.
    pub command_queue_bound: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            call_timeout_ms: 10_000,
            replay_on_start: true,
            replay_on_poll: false,
            command_queue_bound: 64,
            event_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// `poll_interval_ms` as a duration, clamped to at least 1ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// `call_timeout_ms` as a duration, `None` when 0.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}
