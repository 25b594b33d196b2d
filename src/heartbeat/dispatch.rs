//! Heartbeat construction and agent invocation.
//!
//! The wire format to the agent is a fixed command invocation, not a
//! protocol: a single blocking call with a known argument vector. Stdout,
//! stderr, and the exit code are not interpreted; only spawn failure is an
//! error.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

pub const PLUGIN_NAME: &str = env!("CARGO_PKG_NAME");
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One "work occurred on this project around now" record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub project: String,
    pub app_name: String,
    pub app_version: (u32, u32, u32),
}

impl Heartbeat {
    /// Identity string reported to the agent:
    /// `"<host>/<host-version> <plugin>/<plugin-version>"`.
    pub fn plugin_identity(&self) -> String {
        let (major, minor, patch) = self.app_version;
        format!(
            "{}/{major}.{minor}.{patch} {PLUGIN_NAME}/{PLUGIN_VERSION}",
            self.app_name
        )
    }

    /// The fixed agent argument vector.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--plugin".into(),
            self.plugin_identity(),
            "--entity-type".into(),
            "app".into(),
            "--entity".into(),
            self.project.clone(),
            "--project".into(),
            self.project.clone(),
            "--language".into(),
            self.app_name.clone(),
            "--write".into(),
        ]
    }
}

/// Seam between the scheduler's decision logic and the actual subprocess
/// call, so the loop can be tested without spawning anything.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, heartbeat: &Heartbeat) -> Result<()>;
}

/// Dispatches by invoking the agent executable, blocking until it returns.
pub struct AgentDispatch {
    exe_path: PathBuf,
}

impl AgentDispatch {
    pub fn new(exe_path: PathBuf) -> Self {
        Self { exe_path }
    }
}

impl Dispatch for AgentDispatch {
    fn dispatch(&self, heartbeat: &Heartbeat) -> Result<()> {
        let status = Command::new(&self.exe_path)
            .args(heartbeat.to_args())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to invoke agent at {}", self.exe_path.display()))?;
        tracing::debug!(code = ?status.code(), project = %heartbeat.project, "agent invoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat() -> Heartbeat {
        Heartbeat {
            project: "bracket.FCStd".to_string(),
            app_name: "freecad".to_string(),
            app_version: (1, 0, 2),
        }
    }

    #[test]
    fn test_plugin_identity_format() {
        assert_eq!(
            heartbeat().plugin_identity(),
            format!("freecad/1.0.2 pulsetrack/{PLUGIN_VERSION}")
        );
    }

    #[test]
    fn test_argument_vector_matches_contract() {
        let hb = heartbeat();
        assert_eq!(
            hb.to_args(),
            vec![
                "--plugin".to_string(),
                hb.plugin_identity(),
                "--entity-type".to_string(),
                "app".to_string(),
                "--entity".to_string(),
                "bracket.FCStd".to_string(),
                "--project".to_string(),
                "bracket.FCStd".to_string(),
                "--language".to_string(),
                "freecad".to_string(),
                "--write".to_string(),
            ]
        );
    }

    #[test]
    fn test_entity_and_project_are_the_same_label() {
        let args = heartbeat().to_args();
        let entity = args.iter().position(|a| a == "--entity").unwrap();
        let project = args.iter().position(|a| a == "--project").unwrap();
        assert_eq!(args[entity + 1], args[project + 1]);
    }

    #[test]
    fn test_dispatch_missing_executable_is_an_error() {
        let dispatch = AgentDispatch::new(PathBuf::from("/nonexistent/agent-binary"));
        assert!(dispatch.dispatch(&heartbeat()).is_err());
    }
}
