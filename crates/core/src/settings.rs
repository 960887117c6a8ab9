use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Name of the directory created next to the host's settings file
pub const DATA_DIR_NAME: &str = "WindowsNowPlaying";

/// Optional settings file inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// Adapter-wide settings
///
/// Loaded from `settings.toml` in the data directory. Every key is optional;
/// a missing file yields the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    pub cover_file_name: String,
    pub log_filter: String,
    pub log_to_file: bool,
    /// Upper bound on every asynchronous platform call
    pub operation_timeout_ms: u64,
    /// Cadence of backends that have to poll for changes
    pub poll_interval_ms: u64,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            cover_file_name: "cover.png".to_string(),
            log_filter: "info".to_string(),
            log_to_file: true,
            operation_timeout_ms: 2000,
            poll_interval_ms: 1000,
        }
    }
}

impl AdapterSettings {
    /// Load settings from `dir`, falling back to defaults when the file is
    /// missing or malformed
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(SETTINGS_FILE_NAME);
        if !path.exists() {
            return Self::default();
        }

        match Self::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }
}

/// Data directory derived from the host's settings file location
/// (`...\Rainmeter\Rainmeter.data` -> `...\Rainmeter\WindowsNowPlaying`)
pub fn data_dir_for(settings_file: &Path) -> PathBuf {
    match settings_file.parent() {
        Some(parent) => parent.join(DATA_DIR_NAME),
        None => PathBuf::from(DATA_DIR_NAME),
    }
}
