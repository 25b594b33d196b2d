//! Debounced observation of document mutations.
//!
//! The host delivers mutation notifications synchronously on its own thread,
//! so everything here is O(1) and lock-free: a timestamp comparison and at
//! most two atomic stores.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::host::{Console, MutationListener};

use super::unix_now;

/// Mutation bursts inside this window collapse into one recorded timestamp.
pub const DEBOUNCE_WINDOW_SECS: u64 = 10;

/// Timestamp of the last accepted mutation, shared between the observer
/// (sole writer) and the scheduler (sole reader). Zero means "never"; plain
/// relaxed ordering is enough because a late-visible update only defers a
/// heartbeat by one tick.
#[derive(Debug, Default)]
pub struct ActivityState {
    last_modified: AtomicU64,
}

impl ActivityState {
    pub fn last_modified(&self) -> Option<u64> {
        match self.last_modified.load(Ordering::Relaxed) {
            0 => None,
            t => Some(t),
        }
    }

    pub(crate) fn record(&self, now_secs: u64) {
        self.last_modified.store(now_secs, Ordering::Relaxed);
    }
}

/// Rate-limits raw mutation notifications into [`ActivityState`] updates.
///
/// This records the *first* event in each window rather than waiting for
/// events to settle: the question being answered is "did activity occur
/// recently", so recording early is correct and cheaper.
pub struct ChangeObserver {
    activity: Arc<ActivityState>,
    last_event: AtomicU64,
    debug: bool,
    console: Arc<dyn Console>,
}

impl ChangeObserver {
    pub fn new(activity: Arc<ActivityState>, debug: bool, console: Arc<dyn Console>) -> Self {
        Self {
            activity,
            last_event: AtomicU64::new(0),
            debug,
            console,
        }
    }

    /// Handle one mutation at `now_secs`. Returns whether the event was
    /// accepted (outside the debounce window) or discarded.
    pub fn record(&self, now_secs: u64) -> bool {
        let last = self.last_event.load(Ordering::Relaxed);
        if last != 0 && now_secs.saturating_sub(last) < DEBOUNCE_WINDOW_SECS {
            return false;
        }
        self.last_event.store(now_secs, Ordering::Relaxed);
        self.activity.record(now_secs);
        if self.debug {
            self.console
                .info(&format!("Document changed at {now_secs}"));
        }
        true
    }
}

impl MutationListener for ChangeObserver {
    fn on_mutation(&self) {
        self.record(unix_now());
    }
}
