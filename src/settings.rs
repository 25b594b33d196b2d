//! File-backed [`SettingsStore`] implementation.
//!
//! Hosts with a native parameter store implement [`SettingsStore`] directly;
//! this default keeps a namespace → key → bool map in one JSON file.
//! Missing or corrupt files degrade to defaults rather than failing.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::host::SettingsStore;

pub const SETTINGS_FILE_NAME: &str = "pulsetrack-settings.json";

const SETTINGS_FORMAT_VERSION: u32 = 1;

type SettingsMap = HashMap<String, HashMap<String, bool>>;

/// On-disk shape. `#[serde(default)]` keeps old files readable if fields are
/// added later.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    settings: SettingsMap,
}

pub struct JsonSettingsStore {
    path: PathBuf,
    values: Mutex<SettingsMap>,
}

impl JsonSettingsStore {
    /// Open (or lazily create) the store at an explicit file path.
    pub fn new(path: PathBuf) -> Self {
        let values = Self::load(&path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Open the store at `<dir>/pulsetrack-settings.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SETTINGS_FILE_NAME))
    }

    fn load(path: &Path) -> SettingsMap {
        let Ok(content) = fs::read_to_string(path) else {
            return SettingsMap::new();
        };
        match serde_json::from_str::<SettingsFile>(&content) {
            Ok(file) => file.settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable settings file: {e}");
                SettingsMap::new()
            }
        }
    }

    fn persist(&self, values: &SettingsMap) -> Result<()> {
        let parent = self
            .path
            .parent()
            .context("settings path has no parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create settings directory {}", parent.display()))?;

        let file = SettingsFile {
            version: SETTINGS_FORMAT_VERSION,
            settings: values.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("failed to serialize settings")?;

        // Write-then-rename so a crash mid-write never corrupts the file.
        let mut staging =
            NamedTempFile::new_in(parent).context("failed to create settings temp file")?;
        staging
            .write_all(json.as_bytes())
            .context("failed to write settings")?;
        staging
            .persist(&self.path)
            .context("failed to replace settings file")?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_bool(&self, namespace: &str, key: &str, default: bool) -> bool {
        let values = self.values.lock().expect("settings lock poisoned");
        values
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .copied()
            .unwrap_or(default)
    }

    fn set_bool(&self, namespace: &str, key: &str, value: bool) {
        let mut values = self.values.lock().expect("settings lock poisoned");
        values
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        if let Err(e) = self.persist(&values) {
            tracing::warn!("failed to persist settings: {e:#}");
        }
    }
}
