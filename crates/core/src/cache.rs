//! Session cache
//!
//! Holds the single authoritative view of the active media session. Platform
//! notifications are queued as [`CacheEvent`]s and applied one at a time by a
//! worker task; readers only ever see whole snapshots, swapped in as a unit.

use crate::cover::CoverStore;
use crate::models::{MediaProperties, PlaybackInfo, TimelineProperties, TransportControl};
use crate::traits::{
    EventHandler, MediaPlatform, MediaSession, SessionEvent, SessionManager, Subscription,
};
use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Work items processed by the cache worker
#[derive(Debug)]
enum CacheEvent {
    /// The platform switched (or may have switched) the active session
    SessionChanged,
    /// A property group of the session with this generation changed
    Session {
        generation: u64,
        event: SessionEvent,
    },
    Transport(TransportControl),
    Barrier(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Last-known state of the active media session
pub struct SessionCache {
    platform: Arc<dyn MediaPlatform>,
    runtime: Handle,
    cover: CoverStore,
    started: AtomicBool,
    start_lock: tokio::sync::Mutex<()>,
    events: Mutex<Option<mpsc::UnboundedSender<CacheEvent>>>,
    session: RwLock<Option<Arc<dyn MediaSession>>>,
    media: RwLock<Option<Arc<MediaProperties>>>,
    playback: RwLock<Option<Arc<PlaybackInfo>>>,
    timeline: RwLock<Option<Arc<TimelineProperties>>>,
    last_error: RwLock<Option<String>>,
}

impl SessionCache {
    /// Create an idle cache. Nothing talks to the platform until [`start`].
    ///
    /// [`start`]: SessionCache::start
    pub fn new(platform: Arc<dyn MediaPlatform>, cover: CoverStore, runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            platform,
            runtime,
            cover,
            started: AtomicBool::new(false),
            start_lock: tokio::sync::Mutex::new(()),
            events: Mutex::new(None),
            session: RwLock::new(None),
            media: RwLock::new(None),
            playback: RwLock::new(None),
            timeline: RwLock::new(None),
            last_error: RwLock::new(None),
        })
    }

    /// Acquire the session manager and begin tracking the active session.
    ///
    /// Idempotent. On failure the error is recorded, the cache stays
    /// un-started and a later call retries.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let _guard = self.start_lock.lock().await;
        if self.is_started() {
            return Ok(());
        }

        let manager = match self.platform.request_manager().await {
            Ok(manager) => manager,
            Err(e) => {
                self.record_error(format!("Failed to acquire session manager: {:#}", e));
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let changed_tx = tx.clone();
        let handler: EventHandler = Arc::new(move || {
            let _ = changed_tx.send(CacheEvent::SessionChanged);
        });
        let manager_token = match manager
            .on_session_changed(handler)
            .context("Failed to subscribe to session changes")
        {
            Ok(token) => token,
            Err(e) => {
                self.record_error(format!("{:#}", e));
                return Err(e);
            }
        };

        // Resync against whatever is playing right now
        let _ = tx.send(CacheEvent::SessionChanged);

        let worker = CacheWorker {
            cache: self.clone(),
            manager,
            manager_token,
            events: tx.clone(),
            current: None,
            generation: 0,
        };
        self.runtime.spawn(worker.run(rx));

        *self.events.lock() = Some(tx);
        self.started.store(true, Ordering::Release);
        info!("Media session cache started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Remove every platform subscription and stop the worker
    pub async fn shutdown(&self) {
        let _guard = self.start_lock.lock().await;
        let Some(tx) = self.take_sender() else {
            return;
        };

        let (done, wait) = oneshot::channel();
        if tx.send(CacheEvent::Shutdown(done)).is_ok() {
            let _ = wait.await;
        }
        self.started.store(false, Ordering::Release);
        self.clear();
        info!("Media session cache stopped");
    }

    /// Resolves once every queued notification and transport request has
    /// been applied, including ones queued while draining
    pub async fn settled(&self) {
        let Some(tx) = self.sender() else {
            return;
        };

        let (done, wait) = oneshot::channel();
        if tx.send(CacheEvent::Barrier(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Queue a transport request for the active session.
    ///
    /// Fire-and-forget: returns whether the request was queued, not whether
    /// the player honoured it.
    pub fn dispatch(&self, control: TransportControl) -> bool {
        match self.sender() {
            Some(tx) => tx.send(CacheEvent::Transport(control)).is_ok(),
            None => false,
        }
    }

    pub fn session(&self) -> Option<Arc<dyn MediaSession>> {
        self.session.read().clone()
    }

    pub fn media_properties(&self) -> Option<Arc<MediaProperties>> {
        self.media.read().clone()
    }

    pub fn playback_info(&self) -> Option<Arc<PlaybackInfo>> {
        self.playback.read().clone()
    }

    pub fn timeline(&self) -> Option<Arc<TimelineProperties>> {
        self.timeline.read().clone()
    }

    pub fn cover(&self) -> &CoverStore {
        &self.cover
    }

    /// Most recent platform error, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn record_error(&self, message: String) {
        warn!("{}", message);
        *self.last_error.write() = Some(message);
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<CacheEvent>> {
        self.events.lock().clone()
    }

    fn take_sender(&self) -> Option<mpsc::UnboundedSender<CacheEvent>> {
        self.events.lock().take()
    }

    fn clear(&self) {
        *self.session.write() = None;
        self.clear_snapshots();
        self.cover.mark_unavailable();
    }

    fn clear_snapshots(&self) {
        *self.media.write() = None;
        *self.playback.write() = None;
        *self.timeline.write() = None;
    }
}

/// Session currently observed, with its listener registrations
struct WatchedSession {
    session: Arc<dyn MediaSession>,
    tokens: Vec<(SessionEvent, Subscription)>,
}

/// Owner of all platform subscriptions; the only writer of the snapshots
struct CacheWorker {
    cache: Arc<SessionCache>,
    manager: Arc<dyn SessionManager>,
    manager_token: Subscription,
    events: mpsc::UnboundedSender<CacheEvent>,
    current: Option<WatchedSession>,
    generation: u64,
}

impl CacheWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CacheEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                CacheEvent::SessionChanged => self.on_session_changed().await,
                CacheEvent::Session { generation, event } if generation == self.generation => {
                    self.refresh(event).await;
                }
                CacheEvent::Session { generation, event } => {
                    debug!("Dropping {:?} from stale session generation {}", event, generation);
                }
                CacheEvent::Transport(control) => self.transport(control).await,
                CacheEvent::Barrier(done) => {
                    if rx.is_empty() {
                        let _ = done.send(());
                    } else {
                        let _ = self.events.send(CacheEvent::Barrier(done));
                    }
                }
                CacheEvent::Shutdown(done) => {
                    self.detach();
                    if let Err(e) = self.manager.remove_session_changed(self.manager_token) {
                        warn!("Failed to remove session change handler: {:#}", e);
                    }
                    let _ = done.send(());
                    break;
                }
            }
        }
        debug!("Media session cache worker exited");
    }

    async fn on_session_changed(&mut self) {
        self.detach();
        self.generation += 1;
        self.cache.clear();

        let session = match self.manager.current_session() {
            Ok(session) => session,
            Err(e) => {
                self.cache
                    .record_error(format!("Failed to query current session: {:#}", e));
                None
            }
        };

        let Some(session) = session else {
            info!("No active media session");
            return;
        };

        info!("Active media session: {}", session.source_app_id());

        // Pull everything before listening so there is no stale window
        self.refresh_media(&session).await;
        self.refresh_playback(&session);
        self.refresh_timeline(&session);
        *self.cache.session.write() = Some(session.clone());
        self.attach(session);
    }

    fn attach(&mut self, session: Arc<dyn MediaSession>) {
        let mut tokens = Vec::with_capacity(SessionEvent::ALL.len());
        for event in SessionEvent::ALL {
            let tx = self.events.clone();
            let generation = self.generation;
            let handler: EventHandler = Arc::new(move || {
                let _ = tx.send(CacheEvent::Session { generation, event });
            });

            match session.subscribe(event, handler) {
                Ok(token) => tokens.push((event, token)),
                Err(e) => self
                    .cache
                    .record_error(format!("Failed to subscribe to {:?}: {:#}", event, e)),
            }
        }
        self.current = Some(WatchedSession { session, tokens });
    }

    fn detach(&mut self) {
        let Some(watched) = self.current.take() else {
            return;
        };

        for (event, token) in watched.tokens {
            if let Err(e) = watched.session.unsubscribe(event, token) {
                warn!("Failed to unsubscribe {:?}: {:#}", event, e);
            }
        }
    }

    async fn refresh(&mut self, event: SessionEvent) {
        let Some(session) = self.current.as_ref().map(|w| w.session.clone()) else {
            return;
        };

        match event {
            SessionEvent::MediaPropertiesChanged => self.refresh_media(&session).await,
            SessionEvent::PlaybackInfoChanged => self.refresh_playback(&session),
            SessionEvent::TimelinePropertiesChanged => self.refresh_timeline(&session),
        }
    }

    async fn refresh_media(&self, session: &Arc<dyn MediaSession>) {
        match session.media_properties().await {
            Ok(media) => {
                let media = Arc::new(media);
                debug!("Now playing: {} - {}", media.artist, media.title);
                *self.cache.media.write() = Some(media.clone());
                self.cache.cover.extract(media.thumbnail.as_ref()).await;
            }
            Err(e) => {
                *self.cache.media.write() = None;
                self.cache.cover.mark_unavailable();
                self.cache
                    .record_error(format!("Failed to read media properties: {:#}", e));
            }
        }
    }

    fn refresh_playback(&self, session: &Arc<dyn MediaSession>) {
        let snapshot = match session.playback_info() {
            Ok(info) => Some(Arc::new(info)),
            Err(e) => {
                self.cache
                    .record_error(format!("Failed to read playback info: {:#}", e));
                None
            }
        };
        *self.cache.playback.write() = snapshot;
    }

    fn refresh_timeline(&self, session: &Arc<dyn MediaSession>) {
        let snapshot = match session.timeline_properties() {
            Ok(timeline) => Some(Arc::new(timeline)),
            Err(e) => {
                self.cache
                    .record_error(format!("Failed to read timeline properties: {:#}", e));
                None
            }
        };
        *self.cache.timeline.write() = snapshot;
    }

    async fn transport(&self, control: TransportControl) {
        let Some(watched) = self.current.as_ref() else {
            debug!("No active session, dropping {:?}", control);
            return;
        };

        match watched.session.send(control).await {
            Ok(true) => debug!("{:?} accepted", control),
            Ok(false) => warn!(
                "{:?} declined by {}",
                control,
                watched.session.source_app_id()
            ),
            Err(e) => self
                .cache
                .record_error(format!("Failed to send {:?}: {:#}", control, e)),
        }
    }
}
