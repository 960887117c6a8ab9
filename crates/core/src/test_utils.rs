//! Test utilities: an in-memory media platform
//!
//! The mock records every subscription and transport request and lets tests
//! fire notifications the way the operating system would.

use crate::models::{
    MediaProperties, PlaybackInfo, PlaybackStatus, RepeatMode, TimelineProperties,
    TransportControl,
};
use crate::traits::{
    EventHandler, MediaPlatform, MediaSession, SessionEvent, SessionManager, Subscription,
    Thumbnail,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Encode a tiny PNG for cover tests
pub fn png_bytes() -> Vec<u8> {
    let image = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 40, 40]));
    let mut cursor = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, image::ImageFormat::Png)
        .expect("encode test png");
    cursor.into_inner()
}

/// Thumbnail backed by fixed bytes, or one that always fails to open
#[derive(Debug, Clone)]
pub struct MockThumbnail {
    data: Option<Vec<u8>>,
}

impl MockThumbnail {
    pub fn bytes(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }

    pub fn failing() -> Self {
        Self { data: None }
    }
}

#[async_trait]
impl Thumbnail for MockThumbnail {
    async fn read(&self) -> Result<Vec<u8>> {
        self.data
            .clone()
            .ok_or_else(|| anyhow!("thumbnail stream could not be opened"))
    }
}

/// Sample track used across tests
pub fn sample_media() -> MediaProperties {
    MediaProperties {
        title: "Time".to_string(),
        artist: "Pink Floyd".to_string(),
        album_title: "The Dark Side of the Moon".to_string(),
        genres: vec!["Rock".to_string(), "Progressive".to_string()],
        track_number: 4,
        thumbnail: Some(Arc::new(MockThumbnail::bytes(png_bytes()))),
    }
}

pub fn sample_timeline(position_secs: u64, max_seek_secs: u64) -> TimelineProperties {
    TimelineProperties {
        min_seek: Duration::ZERO,
        max_seek: Duration::from_secs(max_seek_secs),
        position: Duration::from_secs(position_secs),
    }
}

/// Session that stores its state in memory
pub struct MockSession {
    id: String,
    media: Mutex<MediaProperties>,
    playback: Mutex<PlaybackInfo>,
    timeline: Mutex<TimelineProperties>,
    listeners: Mutex<HashMap<i64, (SessionEvent, EventHandler)>>,
    next_token: AtomicI64,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    sent: Mutex<Vec<TransportControl>>,
    fail_media: AtomicBool,
    fail_timeline: AtomicBool,
    /// Mirror shuffle/repeat/seek requests back into the snapshots
    echo_controls: AtomicBool,
}

impl MockSession {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            media: Mutex::new(sample_media()),
            playback: Mutex::new(PlaybackInfo {
                status: PlaybackStatus::Playing,
                shuffle: Some(false),
                repeat: Some(RepeatMode::None),
            }),
            timeline: Mutex::new(sample_timeline(30, 200)),
            listeners: Mutex::new(HashMap::new()),
            next_token: AtomicI64::new(1),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            fail_media: AtomicBool::new(false),
            fail_timeline: AtomicBool::new(false),
            echo_controls: AtomicBool::new(true),
        })
    }

    pub fn set_media(&self, media: MediaProperties) {
        *self.media.lock() = media;
        self.fire(SessionEvent::MediaPropertiesChanged);
    }

    pub fn set_playback(&self, playback: PlaybackInfo) {
        *self.playback.lock() = playback;
        self.fire(SessionEvent::PlaybackInfoChanged);
    }

    pub fn set_timeline(&self, timeline: TimelineProperties) {
        *self.timeline.lock() = timeline;
        self.fire(SessionEvent::TimelinePropertiesChanged);
    }

    pub fn fail_media(&self, fail: bool) {
        self.fail_media.store(fail, Ordering::SeqCst);
    }

    pub fn fail_timeline(&self, fail: bool) {
        self.fail_timeline.store(fail, Ordering::SeqCst);
    }

    pub fn echo_controls(&self, echo: bool) {
        self.echo_controls.store(echo, Ordering::SeqCst);
    }

    /// Invoke every handler registered for `event`
    pub fn fire(&self, event: SessionEvent) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .values()
            .filter(|(kind, _)| *kind == event)
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<TransportControl> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MediaSession for MockSession {
    fn source_app_id(&self) -> String {
        self.id.clone()
    }

    async fn media_properties(&self) -> Result<MediaProperties> {
        if self.fail_media.load(Ordering::SeqCst) {
            return Err(anyhow!("media properties unavailable"));
        }
        Ok(self.media.lock().clone())
    }

    fn playback_info(&self) -> Result<PlaybackInfo> {
        Ok(*self.playback.lock())
    }

    fn timeline_properties(&self) -> Result<TimelineProperties> {
        if self.fail_timeline.load(Ordering::SeqCst) {
            return Err(anyhow!("timeline unavailable"));
        }
        Ok(*self.timeline.lock())
    }

    fn subscribe(&self, event: SessionEvent, handler: EventHandler) -> Result<Subscription> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(token, (event, handler));
        Ok(Subscription(token))
    }

    fn unsubscribe(&self, event: SessionEvent, token: Subscription) -> Result<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        let mut listeners = self.listeners.lock();
        match listeners.get(&token.0) {
            Some((kind, _)) if *kind == event => {
                listeners.remove(&token.0);
                Ok(())
            }
            _ => Err(anyhow!("unknown subscription {:?}", token)),
        }
    }

    async fn send(&self, control: TransportControl) -> Result<bool> {
        self.sent.lock().push(control);
        if !self.echo_controls.load(Ordering::SeqCst) {
            return Ok(true);
        }

        match control {
            TransportControl::SetShuffle(active) => {
                let mut playback = *self.playback.lock();
                playback.shuffle = Some(active);
                self.set_playback(playback);
            }
            TransportControl::SetRepeat(mode) => {
                let mut playback = *self.playback.lock();
                playback.repeat = Some(mode);
                self.set_playback(playback);
            }
            TransportControl::Seek(position) => {
                let mut timeline = *self.timeline.lock();
                timeline.position = position;
                self.set_timeline(timeline);
            }
            _ => {}
        }
        Ok(true)
    }
}

/// Session manager with a settable current session
#[derive(Default)]
pub struct MockManager {
    current: Mutex<Option<Arc<MockSession>>>,
    handlers: Mutex<HashMap<i64, EventHandler>>,
    next_token: AtomicI64,
}

impl MockManager {
    /// Switch the active session and notify subscribers
    pub fn set_session(&self, session: Option<Arc<MockSession>>) {
        *self.current.lock() = session;
        let handlers: Vec<EventHandler> = self.handlers.lock().values().cloned().collect();
        for handler in handlers {
            handler();
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl SessionManager for MockManager {
    fn current_session(&self) -> Result<Option<Arc<dyn MediaSession>>> {
        Ok(self
            .current
            .lock()
            .clone()
            .map(|session| session as Arc<dyn MediaSession>))
    }

    fn on_session_changed(&self, handler: EventHandler) -> Result<Subscription> {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().insert(token, handler);
        Ok(Subscription(token))
    }

    fn remove_session_changed(&self, token: Subscription) -> Result<()> {
        self.handlers
            .lock()
            .remove(&token.0)
            .map(|_| ())
            .ok_or_else(|| anyhow!("unknown subscription {:?}", token))
    }
}

/// Platform whose manager can be made unavailable
#[derive(Default)]
pub struct MockPlatform {
    pub manager: Arc<MockManager>,
    unavailable: AtomicBool,
    requests: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_session(session: Arc<MockSession>) -> Arc<Self> {
        let platform = Self::new();
        platform.manager.set_session(Some(session));
        platform
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPlatform for MockPlatform {
    async fn request_manager(&self) -> Result<Arc<dyn SessionManager>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("media session service unavailable"));
        }
        Ok(self.manager.clone())
    }
}
