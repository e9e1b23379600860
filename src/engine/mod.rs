//! Core engine — the per-ticker place → poll → cancel purchase loop.

pub mod dispatcher;
pub mod order;
pub mod retry;

use serde::Deserialize;

use retry::RetryPolicy;

/// Pacing of the purchase loop.
///
/// A run opens up to `placement_windows` windows per ticker. Each window
/// places one limit order and polls it `poll_attempts` times, one poll
/// every `poll_interval_secs`, before cancelling and starting over. The
/// defaults cover roughly a day: 23 windows of up to an hour each.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowPolicy {
    pub placement_windows: u32,
    pub poll_attempts: u32,
    pub poll_interval_secs: u64,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            placement_windows: 23,
            poll_attempts: 60,
            poll_interval_secs: 60,
        }
    }
}

/// Retry and pacing settings, overridable from the `[engine]` config
/// section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnginePolicy {
    pub retry: RetryPolicy,
    pub window: WindowPolicy,
}
