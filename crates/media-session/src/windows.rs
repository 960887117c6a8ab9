//! Windows media sessions via System Media Transport Controls (SMTC)
//!
//! This module uses the Windows Runtime API to follow the session the shell
//! considers current (Spotify, browsers, media players, ...) and to drive its
//! transport controls.
//!
//! Requires Windows 10 version 1809 or later.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use nowplaying_core::{
    AdapterSettings, EventHandler, MediaPlatform, MediaProperties, MediaSession, PlaybackInfo,
    PlaybackStatus, RepeatMode, SessionEvent, SessionManager, Subscription, Thumbnail,
    TimelineProperties, TransportControl,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use windows::{
    core::{AgileReference, RuntimeType},
    Foundation::{
        AsyncStatus, EventRegistrationToken, IAsyncOperation, IAsyncOperationWithProgress,
        TimeSpan, TypedEventHandler,
    },
    Media::Control::{
        GlobalSystemMediaTransportControlsSession, GlobalSystemMediaTransportControlsSessionManager,
        GlobalSystemMediaTransportControlsSessionMediaProperties,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus,
    },
    Media::MediaPlaybackAutoRepeatMode,
    Storage::Streams::{Buffer, DataReader, IRandomAccessStreamReference, InputStreamOptions},
};

/// WinRT time spans count 100ns ticks
const TICKS_PER_SECOND: u64 = 10_000_000;

/// Delay between status checks of a pending WinRT operation
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct SmtcPlatform {
    timeout: Duration,
}

impl SmtcPlatform {
    pub fn new(settings: &AdapterSettings) -> Self {
        Self {
            timeout: settings.operation_timeout(),
        }
    }
}

#[async_trait]
impl MediaPlatform for SmtcPlatform {
    async fn request_manager(&self) -> Result<Arc<dyn SessionManager>> {
        let timeout = self.timeout;
        let manager = run_blocking(move || {
            let operation = GlobalSystemMediaTransportControlsSessionManager::RequestAsync()
                .map_err(|e| anyhow!("Failed to create RequestAsync operation: {}", e))?;
            block_on_async_operation(operation, timeout)
        })
        .await?;

        debug!("SMTC session manager acquired");
        Ok(Arc::new(SmtcManager { manager, timeout }))
    }
}

struct SmtcManager {
    manager: GlobalSystemMediaTransportControlsSessionManager,
    timeout: Duration,
}

impl SessionManager for SmtcManager {
    fn current_session(&self) -> Result<Option<Arc<dyn MediaSession>>> {
        match self.manager.GetCurrentSession() {
            Ok(session) => Ok(Some(Arc::new(SmtcSession {
                session,
                timeout: self.timeout,
            }) as Arc<dyn MediaSession>)),
            Err(e) => {
                debug!("No current session: {}", e);
                Ok(None)
            }
        }
    }

    fn on_session_changed(&self, handler: EventHandler) -> Result<Subscription> {
        let token = self
            .manager
            .CurrentSessionChanged(&TypedEventHandler::new(move |_, _| {
                handler();
                Ok(())
            }))
            .map_err(|e| anyhow!("Failed to subscribe to CurrentSessionChanged: {}", e))?;
        Ok(Subscription(token.Value))
    }

    fn remove_session_changed(&self, token: Subscription) -> Result<()> {
        self.manager
            .RemoveCurrentSessionChanged(EventRegistrationToken { Value: token.0 })
            .map_err(|e| anyhow!("Failed to remove CurrentSessionChanged handler: {}", e))
    }
}

struct SmtcSession {
    session: GlobalSystemMediaTransportControlsSession,
    timeout: Duration,
}

impl SmtcSession {
    /// Run a boolean transport operation to completion off the async runtime
    async fn request(
        &self,
        start: impl FnOnce(
                &GlobalSystemMediaTransportControlsSession,
            ) -> windows::core::Result<IAsyncOperation<bool>>
            + Send
            + 'static,
    ) -> Result<bool> {
        let session = self.session.clone();
        let timeout = self.timeout;
        run_blocking(move || {
            let operation =
                start(&session).map_err(|e| anyhow!("Failed to start transport request: {}", e))?;
            block_on_async_operation(operation, timeout)
        })
        .await
    }
}

#[async_trait]
impl MediaSession for SmtcSession {
    fn source_app_id(&self) -> String {
        self.session
            .SourceAppUserModelId()
            .map(|id| id.to_string())
            .unwrap_or_else(|_| "Unknown".to_string())
    }

    async fn media_properties(&self) -> Result<MediaProperties> {
        let session = self.session.clone();
        let timeout = self.timeout;
        run_blocking(move || {
            let operation = session
                .TryGetMediaPropertiesAsync()
                .map_err(|e| anyhow!("Failed to get media properties: {}", e))?;
            let props = block_on_async_operation(operation, timeout)?;
            Ok(convert_media_properties(&props, timeout))
        })
        .await
    }

    fn playback_info(&self) -> Result<PlaybackInfo> {
        let info = self
            .session
            .GetPlaybackInfo()
            .map_err(|e| anyhow!("Failed to get playback info: {}", e))?;

        let status = match info.PlaybackStatus() {
            Ok(status) => convert_status(status),
            Err(e) => {
                warn!("Failed to read playback status: {}", e);
                PlaybackStatus::Closed
            }
        };
        let shuffle = info.IsShuffleActive().and_then(|value| value.Value()).ok();
        let repeat = info
            .AutoRepeatMode()
            .and_then(|value| value.Value())
            .ok()
            .map(convert_repeat);

        Ok(PlaybackInfo {
            status,
            shuffle,
            repeat,
        })
    }

    fn timeline_properties(&self) -> Result<TimelineProperties> {
        let timeline = self
            .session
            .GetTimelineProperties()
            .map_err(|e| anyhow!("Failed to get timeline properties: {}", e))?;

        Ok(TimelineProperties {
            min_seek: ticks_to_duration(timeline.MinSeekTime()?),
            max_seek: ticks_to_duration(timeline.MaxSeekTime()?),
            position: ticks_to_duration(timeline.Position()?),
        })
    }

    fn subscribe(&self, event: SessionEvent, handler: EventHandler) -> Result<Subscription> {
        let token = match event {
            SessionEvent::MediaPropertiesChanged => self
                .session
                .MediaPropertiesChanged(&TypedEventHandler::new(move |_, _| {
                    handler();
                    Ok(())
                })),
            SessionEvent::PlaybackInfoChanged => {
                self.session
                    .PlaybackInfoChanged(&TypedEventHandler::new(move |_, _| {
                        handler();
                        Ok(())
                    }))
            }
            SessionEvent::TimelinePropertiesChanged => self
                .session
                .TimelinePropertiesChanged(&TypedEventHandler::new(move |_, _| {
                    handler();
                    Ok(())
                })),
        }
        .map_err(|e| anyhow!("Failed to subscribe to {:?}: {}", event, e))?;

        Ok(Subscription(token.Value))
    }

    fn unsubscribe(&self, event: SessionEvent, token: Subscription) -> Result<()> {
        let token = EventRegistrationToken { Value: token.0 };
        match event {
            SessionEvent::MediaPropertiesChanged => {
                self.session.RemoveMediaPropertiesChanged(token)
            }
            SessionEvent::PlaybackInfoChanged => self.session.RemovePlaybackInfoChanged(token),
            SessionEvent::TimelinePropertiesChanged => {
                self.session.RemoveTimelinePropertiesChanged(token)
            }
        }
        .map_err(|e| anyhow!("Failed to unsubscribe from {:?}: {}", event, e))
    }

    async fn send(&self, control: TransportControl) -> Result<bool> {
        match control {
            TransportControl::Play => self.request(|s| s.TryPlayAsync()).await,
            TransportControl::Pause => self.request(|s| s.TryPauseAsync()).await,
            TransportControl::TogglePlayPause => {
                self.request(|s| s.TryTogglePlayPauseAsync()).await
            }
            TransportControl::Stop => self.request(|s| s.TryStopAsync()).await,
            TransportControl::Next => self.request(|s| s.TrySkipNextAsync()).await,
            TransportControl::Previous => self.request(|s| s.TrySkipPreviousAsync()).await,
            TransportControl::Seek(position) => {
                let ticks = duration_to_ticks(position);
                self.request(move |s| s.TryChangePlaybackPositionAsync(ticks))
                    .await
            }
            TransportControl::SetShuffle(active) => {
                self.request(move |s| s.TryChangeShuffleActiveAsync(active))
                    .await
            }
            TransportControl::SetRepeat(mode) => {
                let mode = match mode {
                    RepeatMode::None => MediaPlaybackAutoRepeatMode::None,
                    RepeatMode::Track => MediaPlaybackAutoRepeatMode::Track,
                    RepeatMode::List => MediaPlaybackAutoRepeatMode::List,
                };
                self.request(move |s| s.TryChangeAutoRepeatModeAsync(mode))
                    .await
            }
        }
    }
}

/// Cover art stream published by the session
struct SmtcThumbnail {
    reference: Arc<AgileReference<IRandomAccessStreamReference>>,
    timeout: Duration,
}

impl fmt::Debug for SmtcThumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtcThumbnail").finish_non_exhaustive()
    }
}

#[async_trait]
impl Thumbnail for SmtcThumbnail {
    async fn read(&self) -> Result<Vec<u8>> {
        let reference = self.reference.clone();
        let timeout = self.timeout;
        run_blocking(move || {
            let reference = reference.resolve()?;
            let stream = block_on_async_operation(reference.OpenReadAsync()?, timeout)?;

            let size = u32::try_from(stream.Size()?)
                .map_err(|_| anyhow!("Thumbnail stream is too large"))?;
            if size == 0 {
                return Ok(Vec::new());
            }

            let buffer = Buffer::Create(size)?;
            let operation = stream.ReadAsync(&buffer, size, InputStreamOptions::None)?;
            let filled = block_on_async_operation(operation, timeout)?;

            let reader = DataReader::FromBuffer(&filled)?;
            let mut bytes = vec![0u8; filled.Length()? as usize];
            reader.ReadBytes(&mut bytes)?;
            Ok(bytes)
        })
        .await
    }
}

fn convert_media_properties(
    props: &GlobalSystemMediaTransportControlsSessionMediaProperties,
    timeout: Duration,
) -> MediaProperties {
    let title = props.Title().map(|s| s.to_string()).unwrap_or_default();
    let artist = props.Artist().map(|s| s.to_string()).unwrap_or_default();
    let album_title = props.AlbumTitle().map(|s| s.to_string()).unwrap_or_default();

    let mut genres = Vec::new();
    if let Ok(view) = props.Genres() {
        for i in 0..view.Size().unwrap_or(0) {
            if let Ok(genre) = view.GetAt(i) {
                genres.push(genre.to_string());
            }
        }
    }

    let thumbnail = props
        .Thumbnail()
        .and_then(|reference| AgileReference::new(&reference))
        .ok()
        .map(|reference| {
            Arc::new(SmtcThumbnail {
                reference: Arc::new(reference),
                timeout,
            }) as Arc<dyn Thumbnail>
        });

    debug!("SMTC metadata: title={}, artist={}, album={}", title, artist, album_title);

    MediaProperties {
        title,
        artist,
        album_title,
        genres,
        track_number: props.TrackNumber().unwrap_or(0),
        thumbnail,
    }
}

fn convert_status(
    status: GlobalSystemMediaTransportControlsSessionPlaybackStatus,
) -> PlaybackStatus {
    match status {
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Opened => PlaybackStatus::Opened,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Changing => {
            PlaybackStatus::Changing
        }
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Stopped => PlaybackStatus::Stopped,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Playing => PlaybackStatus::Playing,
        GlobalSystemMediaTransportControlsSessionPlaybackStatus::Paused => PlaybackStatus::Paused,
        _ => PlaybackStatus::Closed,
    }
}

fn convert_repeat(mode: MediaPlaybackAutoRepeatMode) -> RepeatMode {
    match mode {
        MediaPlaybackAutoRepeatMode::Track => RepeatMode::Track,
        MediaPlaybackAutoRepeatMode::List => RepeatMode::List,
        _ => RepeatMode::None,
    }
}

fn ticks_to_duration(span: TimeSpan) -> Duration {
    let ticks = span.Duration.max(0) as u64;
    Duration::new(
        ticks / TICKS_PER_SECOND,
        ((ticks % TICKS_PER_SECOND) * 100) as u32,
    )
}

fn duration_to_ticks(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos() / 100).unwrap_or(i64::MAX)
}

/// WinRT operations the blocking waiter knows how to poll
trait PendingOperation {
    type Output;

    fn status(&self) -> windows::core::Result<AsyncStatus>;

    fn results(&self) -> windows::core::Result<Self::Output>;
}

impl<T: RuntimeType + 'static> PendingOperation for IAsyncOperation<T> {
    type Output = T;

    fn status(&self) -> windows::core::Result<AsyncStatus> {
        self.Status()
    }

    fn results(&self) -> windows::core::Result<T> {
        self.GetResults()
    }
}

impl<T: RuntimeType + 'static, P: RuntimeType + 'static> PendingOperation
    for IAsyncOperationWithProgress<T, P>
{
    type Output = T;

    fn status(&self) -> windows::core::Result<AsyncStatus> {
        self.Status()
    }

    fn results(&self) -> windows::core::Result<T> {
        self.GetResults()
    }
}

/// Block on an async Windows operation, giving up after `timeout`
fn block_on_async_operation<O: PendingOperation>(
    operation: O,
    timeout: Duration,
) -> Result<O::Output> {
    let start = Instant::now();

    loop {
        let status = operation
            .status()
            .map_err(|e| anyhow!("Failed to get operation status: {}", e))?;

        match status {
            AsyncStatus::Completed => {
                return operation
                    .results()
                    .map_err(|e| anyhow!("Failed to get operation results: {}", e));
            }
            AsyncStatus::Error => return Err(anyhow!("Async operation failed with error")),
            AsyncStatus::Canceled => return Err(anyhow!("Async operation was canceled")),
            AsyncStatus::Started => {
                if start.elapsed() > timeout {
                    return Err(anyhow!("Async operation timed out"));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            _ => return Err(anyhow!("Unknown async status")),
        }
    }
}

/// WinRT waits happen on the blocking pool so runtime workers stay free
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("SMTC worker task failed: {}", e))?
}
