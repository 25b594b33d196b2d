//! Heartbeat engine: debounced change observation, the due-time decision,
//! and dispatch to the agent.

pub mod dispatch;
pub mod observer;
pub mod scheduler;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
