//! Linux media sessions via MPRIS (Media Player Remote Interfacing Specification)
//!
//! Players are discovered and queried through `dbus-send`. D-Bus signals are
//! not consumed; a watcher thread polls the preferred player and raises the
//! same change notifications the SMTC backend delivers.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use nowplaying_core::{
    AdapterSettings, EventHandler, MediaPlatform, MediaProperties, MediaSession, PlaybackInfo,
    PlaybackStatus, RepeatMode, SessionEvent, SessionManager, Subscription, Thumbnail,
    TimelineProperties, TransportControl,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

type Metadata = HashMap<String, Vec<String>>;

pub struct MprisPlatform {
    program: PathBuf,
    poll_interval: Duration,
    timeout: Duration,
}

impl MprisPlatform {
    pub fn new(settings: &AdapterSettings) -> Self {
        Self {
            program: PathBuf::from("dbus-send"),
            poll_interval: settings.poll_interval(),
            timeout: settings.operation_timeout(),
        }
    }

    /// Use another `dbus-send` compatible executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl MediaPlatform for MprisPlatform {
    async fn request_manager(&self) -> Result<Arc<dyn SessionManager>> {
        let watcher = Arc::new(Watcher::new(DBus::new(self.program.clone(), self.timeout)));

        let initial = Arc::clone(&watcher);
        run_blocking(move || {
            // Fails when there is no session bus to talk to
            initial.dbus.list_players()?;
            initial.poll();
            Ok(())
        })
        .await?;

        spawn_watcher(&watcher, self.poll_interval)?;
        debug!("MPRIS watcher started");
        Ok(Arc::new(MprisManager { watcher }))
    }
}

struct MprisManager {
    watcher: Arc<Watcher>,
}

impl SessionManager for MprisManager {
    fn current_session(&self) -> Result<Option<Arc<dyn MediaSession>>> {
        Ok(self
            .watcher
            .current
            .lock()
            .clone()
            .map(|session| session as Arc<dyn MediaSession>))
    }

    fn on_session_changed(&self, handler: EventHandler) -> Result<Subscription> {
        let token = self.watcher.next_token.fetch_add(1, Ordering::Relaxed);
        self.watcher.handlers.lock().insert(token, handler);
        Ok(Subscription(token))
    }

    fn remove_session_changed(&self, token: Subscription) -> Result<()> {
        self.watcher
            .handlers
            .lock()
            .remove(&token.0)
            .map(|_| ())
            .ok_or_else(|| anyhow!("Unknown session-changed registration {}", token.0))
    }
}

/// Follows the preferred player and detects changes between polls
struct Watcher {
    dbus: DBus,
    current: Mutex<Option<Arc<MprisSession>>>,
    handlers: Mutex<HashMap<i64, EventHandler>>,
    next_token: AtomicI64,
}

impl Watcher {
    fn new(dbus: DBus) -> Self {
        Self {
            dbus,
            current: Mutex::new(None),
            handlers: Mutex::new(HashMap::new()),
            next_token: AtomicI64::new(1),
        }
    }

    fn poll(&self) {
        let player = match self.dbus.active_player() {
            Ok(player) => player,
            Err(e) => {
                debug!("Failed to list MPRIS players: {}", e);
                None
            }
        };

        let current = self.current.lock().clone();
        match (current, player) {
            (Some(session), Some(name)) if session.bus_name == name => session.refresh(),
            (None, None) => {}
            (_, player) => {
                debug!("Active MPRIS player is now {:?}", player);
                let session =
                    player.map(|name| Arc::new(MprisSession::open(self.dbus.clone(), name)));
                *self.current.lock() = session;

                let handlers: Vec<EventHandler> = self.handlers.lock().values().cloned().collect();
                for handler in handlers {
                    handler();
                }
            }
        }
    }
}

/// The thread only holds a weak reference and exits once the manager is gone
fn spawn_watcher(watcher: &Arc<Watcher>, interval: Duration) -> Result<()> {
    let weak: Weak<Watcher> = Arc::downgrade(watcher);
    thread::Builder::new()
        .name("mpris-watcher".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            let Some(watcher) = weak.upgrade() else {
                debug!("MPRIS watcher stopped");
                break;
            };
            watcher.poll();
        })
        .context("Failed to spawn MPRIS watcher thread")?;
    Ok(())
}

#[derive(Clone, Debug, Default, PartialEq)]
struct PlayerState {
    metadata: Metadata,
    playback: PlaybackInfo,
    position: Duration,
}

impl PlayerState {
    fn timeline(&self) -> TimelineProperties {
        TimelineProperties {
            min_seek: Duration::ZERO,
            max_seek: first(&self.metadata, "mpris:length")
                .and_then(|length| length.parse::<i64>().ok())
                .map(micros_to_duration)
                .unwrap_or_default(),
            position: self.position,
        }
    }

    fn track_id(&self) -> Option<&str> {
        first(&self.metadata, "mpris:trackid")
            .map(String::as_str)
            .filter(|id| id.starts_with('/'))
    }
}

struct MprisSession {
    dbus: DBus,
    bus_name: String,
    state: Mutex<PlayerState>,
    listeners: Mutex<HashMap<i64, (SessionEvent, EventHandler)>>,
    next_token: AtomicI64,
}

impl MprisSession {
    fn open(dbus: DBus, bus_name: String) -> Self {
        let state = match dbus.player_state(&bus_name) {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to read state of {}: {}", bus_name, e);
                PlayerState::default()
            }
        };
        Self {
            dbus,
            bus_name,
            state: Mutex::new(state),
            listeners: Mutex::new(HashMap::new()),
            next_token: AtomicI64::new(1),
        }
    }

    /// Re-read the player and notify listeners of whatever differs
    fn refresh(&self) {
        let fresh = match self.dbus.player_state(&self.bus_name) {
            Ok(state) => state,
            Err(e) => {
                debug!("Failed to refresh {}: {}", self.bus_name, e);
                return;
            }
        };

        let mut changed = Vec::new();
        {
            let mut state = self.state.lock();
            if state.metadata != fresh.metadata {
                changed.push(SessionEvent::MediaPropertiesChanged);
            }
            if state.playback != fresh.playback {
                changed.push(SessionEvent::PlaybackInfoChanged);
            }
            if state.timeline() != fresh.timeline() {
                changed.push(SessionEvent::TimelinePropertiesChanged);
            }
            *state = fresh;
        }

        for event in changed {
            let handlers: Vec<EventHandler> = self
                .listeners
                .lock()
                .values()
                .filter(|(kind, _)| *kind == event)
                .map(|(_, handler)| Arc::clone(handler))
                .collect();
            for handler in handlers {
                handler();
            }
        }
    }
}

#[async_trait]
impl MediaSession for MprisSession {
    fn source_app_id(&self) -> String {
        self.bus_name
            .strip_prefix(MPRIS_PREFIX)
            .unwrap_or(&self.bus_name)
            .to_string()
    }

    async fn media_properties(&self) -> Result<MediaProperties> {
        let metadata = self.state.lock().metadata.clone();
        Ok(convert_metadata(&metadata, self.dbus.timeout))
    }

    fn playback_info(&self) -> Result<PlaybackInfo> {
        Ok(self.state.lock().playback)
    }

    fn timeline_properties(&self) -> Result<TimelineProperties> {
        Ok(self.state.lock().timeline())
    }

    fn subscribe(&self, event: SessionEvent, handler: EventHandler) -> Result<Subscription> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().insert(token, (event, handler));
        Ok(Subscription(token))
    }

    fn unsubscribe(&self, event: SessionEvent, token: Subscription) -> Result<()> {
        let mut listeners = self.listeners.lock();
        match listeners.get(&token.0) {
            Some((kind, _)) if *kind == event => {
                listeners.remove(&token.0);
                Ok(())
            }
            _ => Err(anyhow!("Unknown {:?} registration {}", event, token.0)),
        }
    }

    async fn send(&self, control: TransportControl) -> Result<bool> {
        let dbus = self.dbus.clone();
        let bus_name = self.bus_name.clone();
        let state = self.state.lock().clone();

        let output = run_blocking(move || dbus.transport(&bus_name, control, &state)).await?;
        if output.status.success() {
            Ok(true)
        } else {
            debug!(
                "{} declined {:?}: {}",
                self.bus_name,
                control,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            Ok(false)
        }
    }
}

/// Cover art published through `mpris:artUrl`
#[derive(Debug)]
struct MprisThumbnail {
    url: String,
    timeout: Duration,
}

#[async_trait]
impl Thumbnail for MprisThumbnail {
    async fn read(&self) -> Result<Vec<u8>> {
        // Handle file:// URLs (most local players use these)
        if let Some(path) = self.url.strip_prefix("file://") {
            let path = decode_percent(path);
            return tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read artwork {}", path));
        }

        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            let client = reqwest::Client::builder().timeout(self.timeout).build()?;
            let response = client.get(&self.url).send().await?.error_for_status()?;
            return Ok(response.bytes().await?.to_vec());
        }

        Err(anyhow!("Unsupported artwork URL: {}", self.url))
    }
}

/// Thin wrapper around the `dbus-send` tool
#[derive(Clone)]
struct DBus {
    program: PathBuf,
    timeout: Duration,
}

impl DBus {
    fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    fn run(&self, args: &[String]) -> Result<Output> {
        Command::new(&self.program)
            .arg("--session")
            .arg("--print-reply")
            .arg(format!("--reply-timeout={}", self.timeout.as_millis().max(1)))
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {}", self.program.display()))
    }

    fn reply(&self, args: &[String]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(anyhow!(
                "dbus-send failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn list_players(&self) -> Result<Vec<String>> {
        let stdout = self.reply(&[
            "--dest=org.freedesktop.DBus".to_string(),
            "/org/freedesktop/DBus".to_string(),
            "org.freedesktop.DBus.ListNames".to_string(),
        ])?;
        Ok(order_players(parse_player_names(&stdout)))
    }

    /// A playing player if there is one, otherwise the first available
    fn active_player(&self) -> Result<Option<String>> {
        let players = self.list_players()?;
        for player in &players {
            if let Ok(Some(status)) = self.property(player, "PlaybackStatus") {
                if status == "Playing" {
                    return Ok(Some(player.clone()));
                }
            }
        }
        Ok(players.into_iter().next())
    }

    fn get_property_raw(&self, player: &str, property: &str) -> Result<String> {
        self.reply(&[
            format!("--dest={}", player),
            MPRIS_PATH.to_string(),
            "org.freedesktop.DBus.Properties.Get".to_string(),
            format!("string:{}", PLAYER_INTERFACE),
            format!("string:{}", property),
        ])
    }

    fn property(&self, player: &str, property: &str) -> Result<Option<String>> {
        Ok(parse_variant(&self.get_property_raw(player, property)?))
    }

    fn player_state(&self, player: &str) -> Result<PlayerState> {
        let metadata = parse_metadata(&self.get_property_raw(player, "Metadata")?);
        let status = self
            .property(player, "PlaybackStatus")?
            .map(|status| convert_status(&status))
            .unwrap_or_default();

        // Optional properties; plenty of players leave them out
        let shuffle = self
            .property(player, "Shuffle")
            .ok()
            .flatten()
            .and_then(|value| value.parse::<bool>().ok());
        let repeat = self
            .property(player, "LoopStatus")
            .ok()
            .flatten()
            .and_then(|value| convert_loop_status(&value));
        let position = self
            .property(player, "Position")
            .ok()
            .flatten()
            .and_then(|value| value.parse::<i64>().ok())
            .map(micros_to_duration)
            .unwrap_or_default();

        Ok(PlayerState {
            metadata,
            playback: PlaybackInfo {
                status,
                shuffle,
                repeat,
            },
            position,
        })
    }

    fn transport(
        &self,
        player: &str,
        control: TransportControl,
        state: &PlayerState,
    ) -> Result<Output> {
        let call = |method: &str, args: Vec<String>| {
            let mut full = vec![
                "--type=method_call".to_string(),
                format!("--dest={}", player),
                MPRIS_PATH.to_string(),
                format!("{}.{}", PLAYER_INTERFACE, method),
            ];
            full.extend(args);
            self.run(&full)
        };
        let set = |property: &str, variant: String| {
            self.run(&[
                "--type=method_call".to_string(),
                format!("--dest={}", player),
                MPRIS_PATH.to_string(),
                "org.freedesktop.DBus.Properties.Set".to_string(),
                format!("string:{}", PLAYER_INTERFACE),
                format!("string:{}", property),
                variant,
            ])
        };

        match control {
            TransportControl::Play => call("Play", Vec::new()),
            TransportControl::Pause => call("Pause", Vec::new()),
            TransportControl::TogglePlayPause => call("PlayPause", Vec::new()),
            TransportControl::Stop => call("Stop", Vec::new()),
            TransportControl::Next => call("Next", Vec::new()),
            TransportControl::Previous => call("Previous", Vec::new()),
            TransportControl::Seek(target) => match state.track_id() {
                Some(track) => call(
                    "SetPosition",
                    vec![
                        format!("objpath:{}", track),
                        format!("int64:{}", duration_to_micros(target)),
                    ],
                ),
                None => {
                    let offset = duration_to_micros(target) - duration_to_micros(state.position);
                    call("Seek", vec![format!("int64:{}", offset)])
                }
            },
            TransportControl::SetShuffle(enabled) => {
                set("Shuffle", format!("variant:boolean:{}", enabled))
            }
            TransportControl::SetRepeat(mode) => {
                set("LoopStatus", format!("variant:string:{}", loop_status_name(mode)))
            }
        }
    }
}

fn first<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a String> {
    metadata.get(key).and_then(|values| values.first())
}

fn convert_metadata(metadata: &Metadata, timeout: Duration) -> MediaProperties {
    let text = |key: &str| first(metadata, key).cloned().unwrap_or_default();

    let artist = metadata
        .get("xesam:artist")
        .filter(|artists| !artists.is_empty())
        .or_else(|| metadata.get("xesam:albumArtist"))
        .map(|artists| artists.join(", "))
        .unwrap_or_default();

    let thumbnail = first(metadata, "mpris:artUrl")
        .filter(|url| !url.is_empty())
        .map(|url| {
            Arc::new(MprisThumbnail {
                url: url.clone(),
                timeout,
            }) as Arc<dyn Thumbnail>
        });

    MediaProperties {
        title: text("xesam:title"),
        artist,
        album_title: text("xesam:album"),
        genres: metadata.get("xesam:genre").cloned().unwrap_or_default(),
        track_number: text("xesam:trackNumber").parse().unwrap_or(0),
        thumbnail,
    }
}

fn convert_status(status: &str) -> PlaybackStatus {
    match status {
        "Playing" => PlaybackStatus::Playing,
        "Paused" => PlaybackStatus::Paused,
        "Stopped" => PlaybackStatus::Stopped,
        _ => PlaybackStatus::Closed,
    }
}

fn convert_loop_status(status: &str) -> Option<RepeatMode> {
    match status {
        "None" => Some(RepeatMode::None),
        "Track" => Some(RepeatMode::Track),
        "Playlist" => Some(RepeatMode::List),
        _ => None,
    }
}

fn loop_status_name(mode: RepeatMode) -> &'static str {
    match mode {
        RepeatMode::None => "None",
        RepeatMode::Track => "Track",
        RepeatMode::List => "Playlist",
    }
}

fn micros_to_duration(micros: i64) -> Duration {
    Duration::from_micros(micros.max(0) as u64)
}

fn duration_to_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

/// Bus names of MPRIS players in a `ListNames` reply
fn parse_player_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.contains(MPRIS_PREFIX))
        .filter_map(parse_scalar)
        .collect()
}

/// Browsers go last; they are often playing a video rather than music
fn order_players(players: Vec<String>) -> Vec<String> {
    let (browsers, mut others): (Vec<String>, Vec<String>) =
        players.into_iter().partition(|player| {
            player.contains("firefox") || player.contains("chrome") || player.contains("chromium")
        });
    others.extend(browsers);
    others
}

/// Value of a `type value` or `type "value"` line
fn parse_scalar(line: &str) -> Option<String> {
    let line = line.trim();
    if let (Some(start), Some(end)) = (line.find('"'), line.rfind('"')) {
        if end > start {
            return Some(line[start + 1..end].to_string());
        }
    }
    let mut parts = line.split_whitespace();
    let _kind = parts.next()?;
    parts.next().map(str::to_string)
}

/// Scalar carried by the variant of a `Properties.Get` reply
fn parse_variant(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("variant"))
        .and_then(parse_scalar)
}

/// Flatten the `a{sv}` metadata dictionary of a `Properties.Get` reply.
///
/// Scalars become one-element lists; string arrays keep every element.
fn parse_metadata(output: &str) -> Metadata {
    let mut metadata = Metadata::new();
    let mut key: Option<String> = None;
    let mut array: Option<Vec<String>> = None;
    let mut expect_key = false;

    for line in output.lines().map(str::trim) {
        if let Some(mut values) = array.take() {
            if line.starts_with(']') {
                if let Some(key) = key.take() {
                    metadata.insert(key, values);
                }
            } else {
                values.extend(parse_scalar(line));
                array = Some(values);
            }
            continue;
        }

        if line.starts_with("dict entry(") {
            expect_key = true;
            continue;
        }
        if expect_key {
            expect_key = false;
            key = parse_scalar(line);
            continue;
        }

        // The outer variant wrapping the whole dictionary has no key
        let (Some(rest), Some(name)) = (line.strip_prefix("variant"), key.as_ref()) else {
            continue;
        };
        let rest = rest.trim();
        if let Some(inline) = rest.strip_prefix("array [") {
            if inline.trim_start().starts_with(']') {
                metadata.insert(name.clone(), Vec::new());
                key = None;
            } else {
                array = Some(Vec::new());
            }
        } else {
            metadata.insert(name.clone(), parse_scalar(rest).into_iter().collect());
            key = None;
        }
    }

    metadata
}

fn decode_percent(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("MPRIS worker task failed: {}", e))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowplaying_core::{CoverStore, SessionCache};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tokio::runtime::Handle;

    const METADATA_REPLY: &str = r#"method return time=1700000000.1 sender=:1.42 -> destination=:1.99 serial=7 reply_serial=2
   variant       array [
         dict entry(
            string "mpris:trackid"
            variant                   object path "/org/mpris/MediaPlayer2/Track/4"
         )
         dict entry(
            string "mpris:length"
            variant                   int64 200000000
         )
         dict entry(
            string "mpris:artUrl"
            variant                   string "file:///home/user/Music/Cover%20Art.png"
         )
         dict entry(
            string "xesam:artist"
            variant                   array [
                  string "Pink Floyd"
                  string "Clare Torry"
               ]
         )
         dict entry(
            string "xesam:genre"
            variant                   array [
               ]
         )
         dict entry(
            string "xesam:title"
            variant                   string "Time"
         )
         dict entry(
            string "xesam:album"
            variant                   string "The Dark Side of the Moon"
         )
         dict entry(
            string "xesam:trackNumber"
            variant                   int32 4
         )
      ]
"#;

    const LIST_NAMES_REPLY: &str = r#"method return time=1700000000.2 sender=org.freedesktop.DBus -> destination=:1.99 serial=3 reply_serial=2
   array [
      string "org.freedesktop.DBus"
      string "org.mpris.MediaPlayer2.firefox.instance_1_23"
      string ":1.42"
      string "org.mpris.MediaPlayer2.spotify"
   ]
"#;

    #[test]
    fn test_parse_metadata() {
        let metadata = parse_metadata(METADATA_REPLY);

        assert_eq!(metadata["xesam:title"], vec!["Time"]);
        assert_eq!(metadata["xesam:artist"], vec!["Pink Floyd", "Clare Torry"]);
        assert_eq!(metadata["xesam:trackNumber"], vec!["4"]);
        assert_eq!(metadata["mpris:length"], vec!["200000000"]);
        assert_eq!(metadata["mpris:trackid"], vec!["/org/mpris/MediaPlayer2/Track/4"]);
        assert!(metadata["xesam:genre"].is_empty());
        assert_eq!(metadata.len(), 8);
    }

    #[test]
    fn test_convert_metadata() {
        let media = convert_metadata(&parse_metadata(METADATA_REPLY), Duration::from_secs(1));

        assert_eq!(media.title, "Time");
        assert_eq!(media.artist, "Pink Floyd, Clare Torry");
        assert_eq!(media.album_title, "The Dark Side of the Moon");
        assert_eq!(media.track_number, 4);
        assert!(media.genres.is_empty());
        assert!(media.thumbnail.is_some());
    }

    #[test]
    fn test_convert_empty_metadata() {
        let media = convert_metadata(&Metadata::new(), Duration::from_secs(1));
        assert_eq!(media.title, "");
        assert_eq!(media.artist, "");
        assert_eq!(media.track_number, 0);
        assert!(media.thumbnail.is_none());
    }

    #[test]
    fn test_state_timeline_and_track_id() {
        let state = PlayerState {
            metadata: parse_metadata(METADATA_REPLY),
            playback: PlaybackInfo::default(),
            position: Duration::from_secs(30),
        };

        let timeline = state.timeline();
        assert_eq!(timeline.min_seek, Duration::ZERO);
        assert_eq!(timeline.max_seek, Duration::from_secs(200));
        assert_eq!(timeline.position, Duration::from_secs(30));
        assert_eq!(state.track_id(), Some("/org/mpris/MediaPlayer2/Track/4"));
        assert_eq!(PlayerState::default().track_id(), None);
    }

    #[test]
    fn test_parse_variant() {
        let reply = "method return time=1 sender=:1.42 -> destination=:1.99 serial=8 reply_serial=2\n   variant       string \"Playing\"\n";
        assert_eq!(parse_variant(reply).as_deref(), Some("Playing"));

        let reply = "method return time=1\n   variant       int64 30500000\n";
        assert_eq!(parse_variant(reply).as_deref(), Some("30500000"));

        let reply = "method return time=1\n   variant       boolean true\n";
        assert_eq!(parse_variant(reply).as_deref(), Some("true"));

        assert_eq!(parse_variant("method return time=1\n"), None);
    }

    #[test]
    fn test_player_names_prefer_non_browsers() {
        let players = order_players(parse_player_names(LIST_NAMES_REPLY));
        assert_eq!(
            players,
            vec![
                "org.mpris.MediaPlayer2.spotify".to_string(),
                "org.mpris.MediaPlayer2.firefox.instance_1_23".to_string(),
            ]
        );
    }

    #[test]
    fn test_status_conversions() {
        assert_eq!(convert_status("Playing"), PlaybackStatus::Playing);
        assert_eq!(convert_status("Paused"), PlaybackStatus::Paused);
        assert_eq!(convert_status("Stopped"), PlaybackStatus::Stopped);
        assert_eq!(convert_status("Bogus"), PlaybackStatus::Closed);

        for mode in [RepeatMode::None, RepeatMode::Track, RepeatMode::List] {
            assert_eq!(convert_loop_status(loop_status_name(mode)), Some(mode));
        }
        assert_eq!(convert_loop_status("Shuffle"), None);
    }

    #[test]
    fn test_micros_conversions() {
        assert_eq!(micros_to_duration(1_500_000), Duration::from_millis(1500));
        assert_eq!(micros_to_duration(-5), Duration::ZERO);
        assert_eq!(duration_to_micros(Duration::from_millis(1500)), 1_500_000);
        assert_eq!(duration_to_micros(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_decode_percent() {
        assert_eq!(decode_percent("/home/user/Cover%20Art.png"), "/home/user/Cover Art.png");
        assert_eq!(decode_percent("/a%2"), "/a%2");
        assert_eq!(decode_percent("/caf%C3%A9.jpg"), "/café.jpg");
        assert_eq!(decode_percent("/plain.jpg"), "/plain.jpg");
    }

    #[tokio::test]
    async fn test_thumbnail_reads_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover art.png");
        std::fs::write(&path, b"png").unwrap();

        let thumbnail = MprisThumbnail {
            url: format!("file://{}", path.display().to_string().replace(' ', "%20")),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(thumbnail.read().await.unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_thumbnail_rejects_unknown_scheme() {
        let thumbnail = MprisThumbnail {
            url: "data:image/png;base64,AAAA".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(thumbnail.read().await.is_err());
    }

    /// Stand-in for `dbus-send` serving a single Spotify player.
    /// Every invocation is appended to `calls.log` next to the script.
    fn fake_dbus_send(dir: &Path) -> PathBuf {
        // Spotify only, so the player choice is deterministic
        let list_names: String = LIST_NAMES_REPLY
            .lines()
            .filter(|line| !line.contains("firefox"))
            .map(|line| format!("{}\n", line))
            .collect();
        let property = |value: &str| {
            format!("  printf '%s\\n' 'method return' '   variant       {}' ;;\n", value)
        };

        let mut script = String::from("#!/bin/sh\n");
        script.push_str("echo \"$*\" >> \"$(dirname \"$0\")/calls.log\"\n");
        script.push_str("case \"$*\" in\n");
        script.push_str("*--type=method_call*) ;;\n");
        script.push_str("*ListNames*) cat <<'REPLY'\n");
        script.push_str(&list_names);
        script.push_str("REPLY\n  ;;\n");
        script.push_str("*string:Metadata*) cat <<'REPLY'\n");
        script.push_str(METADATA_REPLY);
        script.push_str("REPLY\n  ;;\n");
        script.push_str("*string:PlaybackStatus*)");
        script.push_str(&property("string \"Playing\""));
        script.push_str("*string:Position*)");
        script.push_str(&property("int64 30000000"));
        script.push_str("*string:Shuffle*)");
        script.push_str(&property("boolean false"));
        script.push_str("*string:LoopStatus*)");
        script.push_str(&property("string \"None\""));
        script.push_str("*) echo 'unexpected call' >&2; exit 1 ;;\nesac\n");

        let path = dir.join("dbus-send");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_session_cache_over_fake_bus() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_dbus_send(dir.path());
        let platform = MprisPlatform::new(&AdapterSettings::default()).with_program(program);
        let cover = CoverStore::in_dir(&dir.path().join("data"), "cover.png").unwrap();
        let cache = SessionCache::new(Arc::new(platform), cover, Handle::current());

        cache.start().await.unwrap();
        cache.settled().await;

        let session = cache.session().unwrap();
        assert_eq!(session.source_app_id(), "spotify");
        let media = cache.media_properties().unwrap();
        assert_eq!(media.title, "Time");
        assert_eq!(media.artist, "Pink Floyd, Clare Torry");
        let playback = cache.playback_info().unwrap();
        assert_eq!(playback.status, PlaybackStatus::Playing);
        assert_eq!(playback.shuffle, Some(false));
        assert_eq!(playback.repeat, Some(RepeatMode::None));
        let timeline = cache.timeline().unwrap();
        assert_eq!(timeline.position, Duration::from_secs(30));
        assert_eq!(timeline.max_seek, Duration::from_secs(200));

        assert!(cache.dispatch(TransportControl::Play));
        assert!(cache.dispatch(TransportControl::Seek(Duration::from_secs(100))));
        assert!(cache.dispatch(TransportControl::SetRepeat(RepeatMode::List)));
        cache.settled().await;
        cache.shutdown().await;

        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert!(calls.contains("--dest=org.mpris.MediaPlayer2.spotify"));
        assert!(calls.contains("org.mpris.MediaPlayer2.Player.Play\n"));
        assert!(calls.contains(
            "org.mpris.MediaPlayer2.Player.SetPosition \
             objpath:/org/mpris/MediaPlayer2/Track/4 int64:100000000"
        ));
        assert!(calls.contains("string:LoopStatus variant:string:Playlist"));
    }

    #[tokio::test]
    async fn test_start_fails_without_bus_program() {
        let dir = tempfile::tempdir().unwrap();
        let platform = MprisPlatform::new(&AdapterSettings::default())
            .with_program(dir.path().join("missing-dbus-send"));
        let cover = CoverStore::in_dir(dir.path(), "cover.png").unwrap();
        let cache = SessionCache::new(Arc::new(platform), cover, Handle::current());

        assert!(cache.start().await.is_err());
        assert!(!cache.is_started());
    }
}
