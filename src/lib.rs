//! Background activity tracking for host-embedded time logging.
//!
//! The crate turns a noisy stream of "document changed" notifications into a
//! rate-limited sequence of heartbeat invocations of the WakaTime CLI agent,
//! and bootstraps that agent (download, extract, chmod) on first use. The
//! host application implements the traits in [`host`] and drives everything
//! through [`ActivityToggle`].

pub mod activation;
pub mod agent;
pub mod error;
pub mod heartbeat;
pub mod host;
pub mod settings;

pub use activation::ActivityToggle;
pub use agent::AgentSpec;
pub use error::TrackerError;
