//! Process-wide `tracing` setup

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "NOWPLAYING_LOG";

pub const LOG_FILE_NAME: &str = "nowplaying.log";

/// Send `tracing` output to `<dir>/nowplaying.log`.
///
/// The host may load the plugin into a process that already has a global
/// subscriber; that one is kept and `Ok(None)` is returned.
pub fn init(dir: &Path, filter: &str) -> Result<Option<PathBuf>> {
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .is_ok();

    Ok(installed.then_some(path))
}
