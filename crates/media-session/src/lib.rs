//! Platform media session backends
//!
//! Each backend implements the [`MediaPlatform`] seam from `nowplaying-core`:
//! - Windows: System Media Transport Controls (SMTC)
//! - Linux: MPRIS via D-Bus, polled
//!
//! [`MediaPlatform`]: nowplaying_core::MediaPlatform

use nowplaying_core::{AdapterSettings, MediaPlatform};
use std::sync::Arc;

// Platform-specific modules
#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
pub use self::linux::MprisPlatform;

#[cfg(target_os = "windows")]
pub use self::windows::SmtcPlatform;

/// Create the media platform for the running operating system
pub fn create_media_platform(settings: &AdapterSettings) -> Arc<dyn MediaPlatform> {
    #[cfg(target_os = "linux")]
    return Arc::new(MprisPlatform::new(settings));

    #[cfg(target_os = "windows")]
    return Arc::new(SmtcPlatform::new(settings));

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    compile_error!("Unsupported platform - media sessions require Windows or Linux");
}
