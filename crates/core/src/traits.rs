use crate::models::{MediaProperties, PlaybackInfo, TimelineProperties, TransportControl};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Callback invoked by the platform when something changed.
///
/// Handlers must return quickly and never panic: a failing handler can get
/// the adapter unsubscribed from future notifications.
pub type EventHandler = Arc<dyn Fn() + Send + Sync>;

/// Per-session change notifications
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    MediaPropertiesChanged,
    PlaybackInfoChanged,
    TimelinePropertiesChanged,
}

impl SessionEvent {
    pub const ALL: [SessionEvent; 3] = [
        SessionEvent::MediaPropertiesChanged,
        SessionEvent::PlaybackInfoChanged,
        SessionEvent::TimelinePropertiesChanged,
    ];
}

/// Registration token returned when subscribing to a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(pub i64);

/// Entry point into the platform's media session service
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    /// Request the session manager. Failure means the service is unavailable.
    async fn request_manager(&self) -> Result<Arc<dyn SessionManager>>;
}

/// Tracks which application currently owns media playback
pub trait SessionManager: Send + Sync {
    /// The currently active session, `None` when nothing is playing
    fn current_session(&self) -> Result<Option<Arc<dyn MediaSession>>>;

    fn on_session_changed(&self, handler: EventHandler) -> Result<Subscription>;

    fn remove_session_changed(&self, token: Subscription) -> Result<()>;
}

/// A single application's media session
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Identifier of the application owning the session
    fn source_app_id(&self) -> String;

    async fn media_properties(&self) -> Result<MediaProperties>;

    fn playback_info(&self) -> Result<PlaybackInfo>;

    fn timeline_properties(&self) -> Result<TimelineProperties>;

    fn subscribe(&self, event: SessionEvent, handler: EventHandler) -> Result<Subscription>;

    fn unsubscribe(&self, event: SessionEvent, token: Subscription) -> Result<()>;

    /// Issue a transport request. `Ok(false)` means the player declined it.
    async fn send(&self, control: TransportControl) -> Result<bool>;
}

/// Readable reference to a track's cover art
#[async_trait]
pub trait Thumbnail: Send + Sync + fmt::Debug {
    async fn read(&self) -> Result<Vec<u8>>;
}
