//! External time-tracking agent: platform resolution and bootstrap.
//!
//! The agent (the WakaTime CLI) lives in a fixed per-user directory. Where
//! it is installed from and what the executable is called are pure functions
//! of the platform, resolved once and immutable afterwards.

pub mod archive;
pub mod client;
pub mod install;

use std::path::{Path, PathBuf};

use crate::error::TrackerError;

/// Directory under the user home that holds the agent.
pub const AGENT_DIR_NAME: &str = "wakatime-cli";

/// Extracted archive entries carrying this prefix are agent executables.
pub const AGENT_ENTRY_PREFIX: &str = "wakatime-cli";

const DOWNLOAD_BASE: &str =
    "https://github.com/wakatime/wakatime-cli/releases/latest/download";

/// Platforms an agent build is published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    LinuxAmd64,
    LinuxArm64,
    MacosAmd64,
    MacosArm64,
    WindowsAmd64,
}

impl Platform {
    /// Detect the platform this process runs on.
    pub fn current() -> Option<Self> {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            Some(Self::LinuxAmd64)
        }
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        {
            Some(Self::LinuxArm64)
        }
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        {
            Some(Self::MacosAmd64)
        }
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            Some(Self::MacosArm64)
        }
        #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
        {
            Some(Self::WindowsAmd64)
        }
        #[cfg(not(any(
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "aarch64"),
            all(target_os = "macos", target_arch = "x86_64"),
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "windows", target_arch = "x86_64"),
        )))]
        {
            None
        }
    }

    fn archive_name(self) -> &'static str {
        match self {
            Self::LinuxAmd64 => "wakatime-cli-linux-amd64.zip",
            Self::LinuxArm64 => "wakatime-cli-linux-arm64.zip",
            Self::MacosAmd64 => "wakatime-cli-darwin-amd64.zip",
            Self::MacosArm64 => "wakatime-cli-darwin-arm64.zip",
            Self::WindowsAmd64 => "wakatime-cli-windows-amd64.zip",
        }
    }

    fn executable_name(self) -> &'static str {
        match self {
            Self::WindowsAmd64 => "wakatime-cli.exe",
            _ => "wakatime",
        }
    }
}

/// Resolved install location and download source for the agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub install_dir: PathBuf,
    pub exe_path: PathBuf,
    pub download_url: String,
}

impl AgentSpec {
    /// Resolve for the current platform and user.
    pub fn resolve() -> Result<Self, TrackerError> {
        let platform = Platform::current().ok_or_else(|| {
            TrackerError::UnsupportedPlatform(format!(
                "{}/{}",
                std::env::consts::OS,
                std::env::consts::ARCH
            ))
        })?;
        let home = dirs::home_dir().ok_or(TrackerError::NoHomeDirectory)?;
        Ok(Self::for_platform(platform, &home))
    }

    /// Resolve for an explicit platform and home directory. Pure; no I/O.
    pub fn for_platform(platform: Platform, home: &Path) -> Self {
        let install_dir = home.join(AGENT_DIR_NAME);
        let exe_path = install_dir.join(platform.executable_name());
        let download_url = format!("{DOWNLOAD_BASE}/{}", platform.archive_name());
        Self {
            install_dir,
            exe_path,
            download_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_posix_layout() {
        let spec = AgentSpec::for_platform(Platform::LinuxAmd64, &PathBuf::from("/home/u"));
        assert_eq!(spec.install_dir, PathBuf::from("/home/u/wakatime-cli"));
        assert_eq!(spec.exe_path, PathBuf::from("/home/u/wakatime-cli/wakatime"));
        assert!(spec.download_url.ends_with("wakatime-cli-linux-amd64.zip"));
    }

    #[test]
    fn test_windows_executable_has_extension() {
        let spec = AgentSpec::for_platform(Platform::WindowsAmd64, &PathBuf::from("C:/Users/u"));
        assert!(spec.exe_path.ends_with("wakatime-cli.exe"));
        assert!(spec.download_url.ends_with("wakatime-cli-windows-amd64.zip"));
    }

    #[test]
    fn test_macos_archives_use_darwin_names() {
        let spec = AgentSpec::for_platform(Platform::MacosArm64, &PathBuf::from("/Users/u"));
        assert!(spec.download_url.ends_with("wakatime-cli-darwin-arm64.zip"));
        assert!(spec.exe_path.ends_with("wakatime"));
    }

    #[test]
    fn test_install_dir_is_consistent_with_exe_path() {
        // One scheme everywhere: the executable always lives inside install_dir.
        for platform in [
            Platform::LinuxAmd64,
            Platform::LinuxArm64,
            Platform::MacosAmd64,
            Platform::MacosArm64,
            Platform::WindowsAmd64,
        ] {
            let spec = AgentSpec::for_platform(platform, &PathBuf::from("/home/u"));
            assert_eq!(spec.exe_path.parent().unwrap(), spec.install_dir);
        }
    }
}
