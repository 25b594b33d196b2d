//! The on/off switch for background tracking.
//!
//! Owns the activation session: a fresh cancellation flag and one dedicated
//! thread per activation, a bounded wait on deactivation, and the persisted
//! `is_active` flag. Activation either fully succeeds (loop running, flag
//! persisted) or fully fails with one user-visible error and no state
//! change.
//!
//! All methods are expected to be called from the host's UI thread; nothing
//! here blocks beyond the 1s deactivation wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::agent::{install, AgentSpec};
use crate::error::TrackerError;
use crate::heartbeat::dispatch::AgentDispatch;
use crate::heartbeat::observer::{ActivityState, ChangeObserver};
use crate::heartbeat::scheduler::HeartbeatScheduler;
use crate::host::{Console, HostApp, MutationListener, SettingsStore};

/// Namespace for persisted settings.
pub const SETTINGS_NAMESPACE: &str = "Plugins/pulsetrack";
pub const KEY_IS_ACTIVE: &str = "is_active";
pub const KEY_DEBUG: &str = "debug";

/// How long deactivation waits for the loop thread before detaching it.
pub const DEACTIVATE_TIMEOUT: Duration = Duration::from_secs(1);

/// One activation session's moving parts.
struct Session {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
    listener: Arc<dyn MutationListener>,
}

pub struct ActivityToggle {
    host: Arc<dyn HostApp>,
    console: Arc<dyn Console>,
    settings: Arc<dyn SettingsStore>,
    agent: AgentSpec,
    session: Option<Session>,
}

impl ActivityToggle {
    /// Build a toggle for the current platform. Fails with
    /// [`TrackerError::UnsupportedPlatform`] when no agent build exists for
    /// this OS/arch; the host should surface that and skip registering the
    /// toggle entirely.
    pub fn new(
        host: Arc<dyn HostApp>,
        console: Arc<dyn Console>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self, TrackerError> {
        let agent = AgentSpec::resolve()?;
        Ok(Self::with_agent_spec(host, console, settings, agent))
    }

    /// Build a toggle against an explicit agent location.
    pub fn with_agent_spec(
        host: Arc<dyn HostApp>,
        console: Arc<dyn Console>,
        settings: Arc<dyn SettingsStore>,
        agent: AgentSpec,
    ) -> Self {
        Self {
            host,
            console,
            settings,
            agent,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Start tracking. Idempotent: a second call while active is a no-op.
    ///
    /// The agent availability gate runs first; on failure the error is
    /// reported once and nothing changes, including the persisted flag.
    pub fn activate(&mut self) {
        if self.session.is_some() {
            self.console.notice("Already active.");
            return;
        }

        self.console.info("Activating...");
        if let Err(e) = install::ensure_ready(&self.agent) {
            self.console.error(&format!("Cannot activate: {e}"));
            return;
        }

        if self.start_session() {
            self.settings.set_bool(SETTINGS_NAMESPACE, KEY_IS_ACTIVE, true);
            self.console.info("Activated.");
        }
    }

    /// Stop tracking. Sets the cancellation flag, waits up to
    /// [`DEACTIVATE_TIMEOUT`] for the loop thread, then proceeds regardless;
    /// a thread that missed the window observes the flag on its next tick
    /// and exits detached.
    pub fn deactivate(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        self.console.notice("Deactivating...");
        session.cancel.store(true, Ordering::Relaxed);

        match session.done_rx.recv_timeout(DEACTIVATE_TIMEOUT) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = session.handle.join();
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!("heartbeat thread busy; detaching, it will exit on its next tick");
            }
        }

        self.host.unregister_mutation_listener(&session.listener);
        self.settings
            .set_bool(SETTINGS_NAMESPACE, KEY_IS_ACTIVE, false);
        self.console.info("Deactivated.");
    }

    /// Flip between active and inactive.
    pub fn toggle(&mut self) {
        if self.is_active() {
            self.deactivate();
        } else {
            self.activate();
        }
    }

    /// Called on host startup: if tracking was active last session, resume
    /// it. Failures are logged by `activate`, never raised, so a missing
    /// agent cannot break host startup.
    pub fn resume_if_active(&mut self) {
        if !self
            .settings
            .get_bool(SETTINGS_NAMESPACE, KEY_IS_ACTIVE, false)
        {
            return;
        }
        self.activate();
        if self.is_active() {
            self.console.info("Activated on startup.");
        }
    }

    fn start_session(&mut self) -> bool {
        let debug = self.settings.get_bool(SETTINGS_NAMESPACE, KEY_DEBUG, false);

        let activity = Arc::new(ActivityState::default());
        let observer = Arc::new(ChangeObserver::new(
            activity.clone(),
            debug,
            self.console.clone(),
        ));
        let listener: Arc<dyn MutationListener> = observer;
        self.host.register_mutation_listener(listener.clone());

        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let scheduler = HeartbeatScheduler::new(
            self.host.clone(),
            self.console.clone(),
            activity,
            Arc::new(AgentDispatch::new(self.agent.exe_path.clone())),
            debug,
        );

        let loop_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name("pulsetrack-heartbeat".to_string())
            .spawn(move || {
                scheduler.run(loop_cancel);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                self.session = Some(Session {
                    cancel,
                    handle,
                    done_rx,
                    listener,
                });
                true
            }
            Err(e) => {
                self.host.unregister_mutation_listener(&listener);
                self.console
                    .error(&format!("Cannot activate: failed to start tracking thread: {e}"));
                false
            }
        }
    }
}

impl Drop for ActivityToggle {
    fn drop(&mut self) {
        // Stop the loop but keep the persisted flag as-is so tracking
        // resumes on the next host start.
        if let Some(session) = self.session.take() {
            session.cancel.store(true, Ordering::Relaxed);
        }
    }
}
