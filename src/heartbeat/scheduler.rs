//! The heartbeat control loop.
//!
//! Once per tick the scheduler polls the host for the active document,
//! checks eligibility, and decides whether a heartbeat is due. Errors never
//! terminate the loop; it exits only when the cancellation flag is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::host::{Console, HostApp};

use super::dispatch::{Dispatch, Heartbeat};
use super::observer::ActivityState;
use super::unix_now;

/// Interval between scheduler polls.
pub const TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Minimum spacing between two heartbeats.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// A heartbeat is only sent while the last mutation is younger than this.
pub const RECENT_ACTIVITY_SECS: u64 = 60;

/// Documents whose label carries this prefix have no persisted identity yet
/// and are never tracked.
pub const UNNAMED_PREFIX: &str = "Unnamed";

/// Whether a heartbeat should be sent at `now`.
///
/// `None` means "never": a missing modification timestamp blocks sending,
/// while a missing last-heartbeat timestamp leaves the rate limit open.
pub(crate) fn heartbeat_due(
    now: u64,
    last_modified: Option<u64>,
    last_heartbeat: Option<u64>,
) -> bool {
    let Some(modified) = last_modified else {
        return false;
    };
    let rate_limit_open = last_heartbeat.is_none_or(|t| now.saturating_sub(t) > HEARTBEAT_INTERVAL_SECS);
    let activity_recent = now.saturating_sub(modified) < RECENT_ACTIVITY_SECS;
    rate_limit_open && activity_recent
}

/// What a single tick did; drives nothing, but makes the loop observable in
/// tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    NoDocument,
    UnsavedDocument,
    NotDue,
    Dispatched,
}

pub struct HeartbeatScheduler {
    host: Arc<dyn HostApp>,
    console: Arc<dyn Console>,
    activity: Arc<ActivityState>,
    dispatch: Arc<dyn Dispatch>,
    project: Option<String>,
    last_heartbeat: Option<u64>,
    debug: bool,
}

impl HeartbeatScheduler {
    pub fn new(
        host: Arc<dyn HostApp>,
        console: Arc<dyn Console>,
        activity: Arc<ActivityState>,
        dispatch: Arc<dyn Dispatch>,
        debug: bool,
    ) -> Self {
        Self {
            host,
            console,
            activity,
            dispatch,
            project: None,
            last_heartbeat: None,
            debug,
        }
    }

    /// Run one poll at `now`.
    pub(crate) fn tick(&mut self, now: u64) -> TickOutcome {
        let Some(label) = self.host.active_document_label() else {
            self.console.info("No active document, waiting...");
            return TickOutcome::NoDocument;
        };

        if label.starts_with(UNNAMED_PREFIX) {
            self.console
                .notice("Please save the project to start tracking.");
            return TickOutcome::UnsavedDocument;
        }

        if self.project.as_deref() != Some(label.as_str()) {
            self.console.info(&format!("Project: {label}"));
            self.project = Some(label.clone());
        }

        if !heartbeat_due(now, self.activity.last_modified(), self.last_heartbeat) {
            if self.debug {
                self.console.info(&format!(
                    "No heartbeat due, next check in {}s.",
                    TICK_INTERVAL.as_secs()
                ));
            }
            return TickOutcome::NotDue;
        }

        self.console
            .info(&format!("Logging time for project '{label}'..."));
        let heartbeat = Heartbeat {
            project: label,
            app_name: self.host.app_name().to_string(),
            app_version: self.host.version(),
        };
        match self.dispatch.dispatch(&heartbeat) {
            Ok(()) => self.console.info("Time logged."),
            Err(e) => self.console.error(&format!("Failed to log time: {e:#}")),
        }
        // Recorded on failure too, so a broken agent is retried at the
        // normal interval instead of every tick.
        self.last_heartbeat = Some(now);
        TickOutcome::Dispatched
    }

    /// Poll until `cancel` is set. The flag is checked before and after each
    /// sleep, bounding deactivation latency to one tick plus any in-flight
    /// agent call.
    pub fn run(mut self, cancel: Arc<AtomicBool>) {
        tracing::debug!("heartbeat loop started");
        while !cancel.load(Ordering::Relaxed) {
            self.tick(unix_now());
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(TICK_INTERVAL);
        }
        tracing::debug!("heartbeat loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use crate::host::MutationListener;

    struct NullConsole;
    impl Console for NullConsole {
        fn info(&self, _: &str) {}
        fn notice(&self, _: &str) {}
        fn error(&self, _: &str) {}
    }

    struct FakeHost {
        label: Mutex<Option<String>>,
    }

    impl FakeHost {
        fn with_label(label: &str) -> Arc<Self> {
            Arc::new(Self {
                label: Mutex::new(Some(label.to_string())),
            })
        }

        fn set_label(&self, label: Option<&str>) {
            *self.label.lock().unwrap() = label.map(str::to_string);
        }
    }

    impl HostApp for FakeHost {
        fn app_name(&self) -> &str {
            "freecad"
        }
        fn version(&self) -> (u32, u32, u32) {
            (1, 0, 0)
        }
        fn active_document_label(&self) -> Option<String> {
            self.label.lock().unwrap().clone()
        }
        fn register_mutation_listener(&self, _: Arc<dyn MutationListener>) {}
        fn unregister_mutation_listener(&self, _: &Arc<dyn MutationListener>) {}
    }

    struct CountingDispatch {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingDispatch {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl Dispatch for CountingDispatch {
        fn dispatch(&self, _: &Heartbeat) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(anyhow!("agent exploded"))
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(
        host: Arc<FakeHost>,
        dispatch: Arc<CountingDispatch>,
    ) -> (Arc<ActivityState>, HeartbeatScheduler) {
        let activity = Arc::new(ActivityState::default());
        let sched = HeartbeatScheduler::new(
            host,
            Arc::new(NullConsole),
            activity.clone(),
            dispatch,
            false,
        );
        (activity, sched)
    }

    fn mutate(activity: &ActivityState, at: u64) {
        activity.record(at);
    }

    #[test]
    fn test_due_logic_scenarios() {
        // Mutation at t=0 is indistinguishable from "never"; use t=1.
        assert!(heartbeat_due(10, Some(1), None));
        // Second check inside the rate-limit window.
        assert!(!heartbeat_due(20, Some(15), Some(10)));
        // Stale activity, even with the rate limit open.
        assert!(!heartbeat_due(65, Some(1), None));
        assert!(!heartbeat_due(200, Some(100), Some(100)));
        // No mutation yet.
        assert!(!heartbeat_due(10, None, None));
        // Rate limit must be strictly greater than the interval.
        assert!(!heartbeat_due(160, Some(130), Some(100)));
        assert!(heartbeat_due(161, Some(130), Some(100)));
    }

    #[test]
    fn test_no_document_stays_idle() {
        let host = FakeHost::with_label("part.FCStd");
        host.set_label(None);
        let dispatch = CountingDispatch::new(false);
        let (_, mut sched) = scheduler(host, dispatch.clone());
        assert_eq!(sched.tick(100), TickOutcome::NoDocument);
        assert_eq!(dispatch.count(), 0);
    }

    #[test]
    fn test_unnamed_document_never_dispatches() {
        let host = FakeHost::with_label("Unnamed-3");
        let dispatch = CountingDispatch::new(false);
        let (activity, mut sched) = scheduler(host, dispatch.clone());
        mutate(&activity, 95);
        assert_eq!(sched.tick(100), TickOutcome::UnsavedDocument);
        assert_eq!(dispatch.count(), 0);
    }

    #[test]
    fn test_dispatches_when_due_and_rate_limits_after() {
        let host = FakeHost::with_label("part.FCStd");
        let dispatch = CountingDispatch::new(false);
        let (activity, mut sched) = scheduler(host, dispatch.clone());

        mutate(&activity, 100);
        assert_eq!(sched.tick(110), TickOutcome::Dispatched);
        assert_eq!(dispatch.count(), 1);

        // Mutation at t=115, check at t=120: only 10s since the last send.
        mutate(&activity, 115);
        assert_eq!(sched.tick(120), TickOutcome::NotDue);
        assert_eq!(dispatch.count(), 1);

        // Window reopens 60s after the last send, and activity is recent.
        mutate(&activity, 165);
        assert_eq!(sched.tick(171), TickOutcome::Dispatched);
        assert_eq!(dispatch.count(), 2);
    }

    #[test]
    fn test_stale_activity_is_not_logged() {
        let host = FakeHost::with_label("part.FCStd");
        let dispatch = CountingDispatch::new(false);
        let (activity, mut sched) = scheduler(host, dispatch.clone());
        mutate(&activity, 100);
        assert_eq!(sched.tick(165), TickOutcome::NotDue);
        assert_eq!(dispatch.count(), 0);
    }

    #[test]
    fn test_no_mutation_means_no_heartbeat() {
        let host = FakeHost::with_label("part.FCStd");
        let dispatch = CountingDispatch::new(false);
        let (_, mut sched) = scheduler(host, dispatch.clone());
        assert_eq!(sched.tick(100), TickOutcome::NotDue);
        assert_eq!(dispatch.count(), 0);
    }

    #[test]
    fn test_failed_dispatch_still_throttles() {
        let host = FakeHost::with_label("part.FCStd");
        let dispatch = CountingDispatch::new(true);
        let (activity, mut sched) = scheduler(host, dispatch.clone());

        mutate(&activity, 100);
        assert_eq!(sched.tick(110), TickOutcome::Dispatched);
        // The failure is logged, not retried on the next tick.
        mutate(&activity, 115);
        assert_eq!(sched.tick(120), TickOutcome::NotDue);
        assert_eq!(dispatch.count(), 1);
    }

    #[test]
    fn test_project_switch_is_informational_only() {
        let host = FakeHost::with_label("alpha.FCStd");
        let dispatch = CountingDispatch::new(false);
        let (activity, mut sched) = scheduler(host.clone(), dispatch.clone());

        mutate(&activity, 100);
        assert_eq!(sched.tick(110), TickOutcome::Dispatched);

        // Switching documents does not reset the rate limit.
        host.set_label(Some("beta.FCStd"));
        mutate(&activity, 115);
        assert_eq!(sched.tick(120), TickOutcome::NotDue);
        assert_eq!(dispatch.count(), 1);
    }
}
