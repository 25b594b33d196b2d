//! Error taxonomy for activation-time failures.
//!
//! Errors inside the running heartbeat loop are logged and swallowed at the
//! loop boundary; only activation (locating, installing, or probing the
//! agent) surfaces typed errors to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// No agent build exists for this OS/architecture combination.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The user home directory could not be determined, so there is nowhere
    /// to install the agent.
    #[error("cannot determine home directory")]
    NoHomeDirectory,

    /// Download, extraction, or installation of the agent failed. Retryable
    /// on the next activation attempt.
    #[error("agent installation failed: {0:#}")]
    InstallationFailed(anyhow::Error),

    /// The agent executable exists on disk but could not be run. A broken
    /// install is surfaced rather than silently reinstalled.
    #[error("agent executable could not be run: {0:#}")]
    AgentUnreachable(anyhow::Error),
}
