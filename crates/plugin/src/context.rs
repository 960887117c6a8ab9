//! State shared by every measure of the process

use crate::host::{HostApi, LogLevel};
use crate::logging;
use anyhow::{Context, Result};
use nowplaying_core::{data_dir_for, AdapterSettings, CoverStore, MediaPlatform, SessionCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

/// Builds the media platform once settings are known
pub type PlatformFactory = Box<dyn Fn(&AdapterSettings) -> Arc<dyn MediaPlatform> + Send + Sync>;

/// Async runtime plus the session cache it drives
pub struct PluginContext {
    runtime: Runtime,
    cache: Arc<SessionCache>,
    data_dir: PathBuf,
}

impl PluginContext {
    /// Set up the data directory, logging, runtime and cache. The cache is
    /// not started.
    pub fn create(host: &dyn HostApi, platform: &PlatformFactory) -> Result<Self> {
        let settings_file = host
            .settings_file()
            .context("Host did not report a settings file")?;
        let data_dir = data_dir_for(&settings_file);
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;

        let settings = AdapterSettings::load_or_default(&data_dir);
        if settings.log_to_file {
            if let Err(e) = logging::init(&data_dir, &settings.log_filter) {
                host.log(LogLevel::Warning, &format!("Logging disabled: {:#}", e));
            }
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("nowplaying")
            .enable_all()
            .build()
            .context("Failed to build async runtime")?;

        let cover = CoverStore::in_dir(&data_dir, &settings.cover_file_name)?;
        let cache = SessionCache::new(platform(&settings), cover, runtime.handle().clone());

        info!("Plugin context ready in {}", data_dir.display());
        Ok(Self {
            runtime,
            cache,
            data_dir,
        })
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Start the cache unless it already runs
    pub fn ensure_started(&self) -> Result<()> {
        if self.cache.is_started() {
            return Ok(());
        }
        self.runtime.block_on(self.cache.start())
    }

    /// Block until queued notifications and commands have been applied
    pub fn settle(&self) {
        self.runtime.block_on(self.cache.settled());
    }

    /// Unsubscribe from the platform and stop the runtime
    pub fn shutdown(self) {
        self.runtime.block_on(self.cache.shutdown());
        self.runtime.shutdown_timeout(Duration::from_secs(1));
        info!("Plugin context released");
    }
}
