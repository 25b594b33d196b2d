//! Agent bootstrap: verify an existing install or perform a fresh one.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use wait_timeout::ChildExt;

use super::archive::extract_archive;
use super::client::{create_http_client, download_with_limit, validate_response_status, MAX_ARCHIVE_SIZE};
use super::{AgentSpec, AGENT_ENTRY_PREFIX};
use crate::error::TrackerError;

/// Upper bound on the `--version` probe of an existing install.
pub(crate) const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Make sure the agent is present and runnable.
///
/// An executable already on disk is probed with `--version`; a probe failure
/// is surfaced as [`TrackerError::AgentUnreachable`] without attempting a
/// reinstall, so a broken install stays visible instead of being silently
/// churned. A missing executable triggers download + extraction into the
/// install directory. Nothing is cached across calls; every activation
/// re-verifies.
pub fn ensure_ready(spec: &AgentSpec) -> Result<(), TrackerError> {
    if spec.exe_path.exists() {
        probe_version(&spec.exe_path).map_err(TrackerError::AgentUnreachable)
    } else {
        install(spec).map_err(TrackerError::InstallationFailed)
    }
}

/// Run `<exe> --version` and wait for it to finish. Exit status is not
/// interpreted; only "starts and returns" vs "cannot run" matters.
fn probe_version(exe_path: &Path) -> Result<()> {
    let mut child = Command::new(exe_path)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to run agent at {}", exe_path.display()))?;

    match child
        .wait_timeout(VERSION_PROBE_TIMEOUT)
        .context("failed to wait for agent version probe")?
    {
        Some(status) => {
            tracing::debug!(code = ?status.code(), "agent version probe finished");
            Ok(())
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            bail!(
                "agent version probe did not finish within {}s",
                VERSION_PROBE_TIMEOUT.as_secs()
            )
        }
    }
}

fn install(spec: &AgentSpec) -> Result<()> {
    tracing::debug!(url = %spec.download_url, "downloading agent archive");
    let client = create_http_client()?;
    let response = client
        .get(&spec.download_url)
        .send()
        .context("failed to download agent archive")?;
    validate_response_status(&response, "agent download failed")?;
    let bytes = download_with_limit(response, MAX_ARCHIVE_SIZE, "agent download")?;

    let checksum = hex::encode(Sha256::digest(&bytes));
    tracing::debug!(%checksum, size = bytes.len(), "agent archive downloaded");

    extract_archive(&bytes, &spec.install_dir)?;
    promote_executable(spec)
}

/// Find the extracted entry named after the agent, move it to its final
/// path, and mark it executable on unix.
fn promote_executable(spec: &AgentSpec) -> Result<()> {
    let entries = fs::read_dir(&spec.install_dir).with_context(|| {
        format!(
            "failed to read install directory {}",
            spec.install_dir.display()
        )
    })?;

    for entry in entries {
        let path = entry?.path();
        if path == spec.exe_path {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(AGENT_ENTRY_PREFIX) || path.is_dir() {
            continue;
        }

        fs::rename(&path, &spec.exe_path).with_context(|| {
            format!("failed to move agent into place at {}", spec.exe_path.display())
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&spec.exe_path, fs::Permissions::from_mode(0o755))
                .context("failed to set executable permissions on agent")?;
        }

        return Ok(());
    }

    bail!("downloaded archive did not contain a {AGENT_ENTRY_PREFIX}* executable")
}
