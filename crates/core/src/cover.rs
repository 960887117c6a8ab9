//! Cover art extraction
//!
//! The thumbnail published by the active session is decoded and re-encoded as
//! PNG at a fixed path so skins can point an image meter at it. Failures only
//! flip the availability flag; they never reach the host.

use crate::traits::Thumbnail;
use anyhow::{anyhow, bail, Context, Result};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed on-disk location of the current cover plus its availability flag
#[derive(Debug)]
pub struct CoverStore {
    path: PathBuf,
    available: AtomicBool,
}

impl CoverStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            available: AtomicBool::new(false),
        }
    }

    /// Create the store inside `dir`, creating the directory if needed
    pub fn in_dir(dir: &Path, file_name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self::new(dir.join(file_name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the last extraction succeeded
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn mark_unavailable(&self) {
        self.available.store(false, Ordering::Release);
    }

    /// Write the thumbnail to the cover path. Returns the new availability.
    pub async fn extract(&self, thumbnail: Option<&Arc<dyn Thumbnail>>) -> bool {
        let result = match thumbnail {
            Some(thumbnail) => self.write_thumbnail(thumbnail.as_ref()).await,
            None => Err(anyhow!("session published no thumbnail")),
        };

        let available = match result {
            Ok(()) => {
                debug!("Cover written to {}", self.path.display());
                true
            }
            Err(e) => {
                warn!("Cover unavailable: {:#}", e);
                false
            }
        };
        self.available.store(available, Ordering::Release);
        available
    }

    async fn write_thumbnail(&self, thumbnail: &dyn Thumbnail) -> Result<()> {
        let bytes = thumbnail.read().await.context("Failed to read thumbnail")?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || save_png(&bytes, &path))
            .await
            .context("Cover writer task failed")?
    }
}

fn save_png(bytes: &[u8], path: &Path) -> Result<()> {
    if bytes.is_empty() {
        bail!("thumbnail stream is empty");
    }

    let cover = image::load_from_memory(bytes).context("Failed to decode thumbnail")?;
    cover
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}
