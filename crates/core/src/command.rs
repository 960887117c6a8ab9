//! Command parsing and translation into transport requests

use crate::cache::SessionCache;
use crate::models::{RepeatMode, TransportControl};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Commands kept for compatibility with older skins; they do nothing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyCommand {
    SetVolume,
    SetRating,
    OpenPlayer,
    ClosePlayer,
    TogglePlayer,
}

/// A parsed command line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    /// Percentage of the track; `relative` when written with a sign
    SetPosition { value: i32, relative: bool },
    /// `-1` toggles, `0` disables, anything else enables
    SetShuffle(i32),
    /// `-1` cycles, `0` disables, `1` and `2` repeat the list
    SetRepeat(i32),
    Legacy(LegacyCommand),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{0} requires a numeric argument")]
    MissingArgument(String),
    #[error("invalid argument for {command}: {argument}")]
    InvalidArgument { command: String, argument: String },
}

impl Command {
    /// Parse a whitespace-separated command line (`setposition +10`)
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(CommandError::Empty)?.to_lowercase();
        let argument = tokens.next();

        let command = match name.as_str() {
            "play" => Command::Play,
            "pause" => Command::Pause,
            "playpause" => Command::PlayPause,
            "stop" => Command::Stop,
            "next" => Command::Next,
            "previous" => Command::Previous,
            "setposition" => {
                let raw = require_argument(&name, argument)?;
                let value = parse_int(&name, raw)?;
                Command::SetPosition {
                    value,
                    relative: raw.starts_with('+') || raw.starts_with('-'),
                }
            }
            "setshuffle" => {
                Command::SetShuffle(parse_int(&name, require_argument(&name, argument)?)?)
            }
            "setrepeat" => {
                let raw = require_argument(&name, argument)?;
                let value = parse_int(&name, raw)?;
                if !(-1..=2).contains(&value) {
                    return Err(CommandError::InvalidArgument {
                        command: name,
                        argument: raw.to_string(),
                    });
                }
                Command::SetRepeat(value)
            }
            "setvolume" => Command::Legacy(LegacyCommand::SetVolume),
            "setrating" => Command::Legacy(LegacyCommand::SetRating),
            "openplayer" => Command::Legacy(LegacyCommand::OpenPlayer),
            "closeplayer" => Command::Legacy(LegacyCommand::ClosePlayer),
            "toggleplayer" => Command::Legacy(LegacyCommand::TogglePlayer),
            _ => return Err(CommandError::Unknown(name)),
        };
        Ok(command)
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Play => write!(f, "play"),
            Command::Pause => write!(f, "pause"),
            Command::PlayPause => write!(f, "playpause"),
            Command::Stop => write!(f, "stop"),
            Command::Next => write!(f, "next"),
            Command::Previous => write!(f, "previous"),
            Command::SetPosition { value, relative: true } => write!(f, "setposition {:+}", value),
            Command::SetPosition { value, .. } => write!(f, "setposition {}", value),
            Command::SetShuffle(value) => write!(f, "setshuffle {}", value),
            Command::SetRepeat(value) => write!(f, "setrepeat {}", value),
            Command::Legacy(legacy) => write!(f, "{}", format!("{:?}", legacy).to_lowercase()),
        }
    }
}

fn require_argument<'a>(name: &str, argument: Option<&'a str>) -> Result<&'a str, CommandError> {
    argument.ok_or_else(|| CommandError::MissingArgument(name.to_string()))
}

fn parse_int(name: &str, raw: &str) -> Result<i32, CommandError> {
    raw.parse().map_err(|_| CommandError::InvalidArgument {
        command: name.to_string(),
        argument: raw.to_string(),
    })
}

/// Turns commands into transport requests against the cached session
pub struct CommandTranslator<'a> {
    cache: &'a SessionCache,
}

impl<'a> CommandTranslator<'a> {
    pub fn new(cache: &'a SessionCache) -> Self {
        Self { cache }
    }

    /// Parse and dispatch a command line. Returns whether a request was sent.
    pub fn execute_line(&self, line: &str) -> Result<bool, CommandError> {
        let command = Command::parse(line)?;
        Ok(self.execute(command))
    }

    /// Dispatch a parsed command. Returns whether a request was sent.
    pub fn execute(&self, command: Command) -> bool {
        match self.resolve(command) {
            Some(control) => self.cache.dispatch(control),
            None => {
                debug!("'{}' has no effect right now", command);
                false
            }
        }
    }

    /// Work out the transport request for `command` from the cached state.
    /// `None` when there is no session or the command has no effect.
    pub fn resolve(&self, command: Command) -> Option<TransportControl> {
        self.cache.session()?;

        match command {
            Command::Play => Some(TransportControl::Play),
            Command::Pause => Some(TransportControl::Pause),
            Command::PlayPause => Some(TransportControl::TogglePlayPause),
            Command::Stop => Some(TransportControl::Stop),
            Command::Next => Some(TransportControl::Next),
            Command::Previous => Some(TransportControl::Previous),
            Command::SetPosition { value, relative } => self.seek_target(value, relative),
            Command::SetShuffle(value) => {
                let active = match value {
                    -1 => !self.shuffle_active(),
                    0 => false,
                    _ => true,
                };
                Some(TransportControl::SetShuffle(active))
            }
            Command::SetRepeat(value) => {
                let mode = match value {
                    -1 => self.repeat_mode().cycle(),
                    0 => RepeatMode::None,
                    1 | 2 => RepeatMode::List,
                    _ => return None,
                };
                Some(TransportControl::SetRepeat(mode))
            }
            Command::Legacy(_) => None,
        }
    }

    fn seek_target(&self, value: i32, relative: bool) -> Option<TransportControl> {
        let timeline = self.cache.timeline()?;
        let duration = timeline.duration().as_secs_f64();
        let base = if relative {
            timeline.position.as_secs_f64()
        } else {
            0.0
        };

        let offset = base + f64::from(value) / 100.0 * duration;
        let target = timeline.min_seek.as_secs_f64() + offset;
        Duration::try_from_secs_f64(target.max(0.0))
            .ok()
            .map(TransportControl::Seek)
    }

    fn shuffle_active(&self) -> bool {
        self.cache
            .playback_info()
            .map(|info| info.is_shuffle_active())
            .unwrap_or(false)
    }

    fn repeat_mode(&self) -> RepeatMode {
        self.cache
            .playback_info()
            .map(|info| info.repeat_mode())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::CoverStore;
    use crate::models::TimelineProperties;
    use crate::test_utils::{sample_timeline, MockPlatform, MockSession};
    use std::sync::Arc;
    use tokio::runtime::Handle;

    async fn started(
        platform: Arc<MockPlatform>,
        dir: &tempfile::TempDir,
    ) -> Arc<SessionCache> {
        let cover = CoverStore::in_dir(dir.path(), "cover.png").unwrap();
        let cache = SessionCache::new(platform, cover, Handle::current());
        cache.start().await.unwrap();
        cache.settled().await;
        cache
    }

    #[test]
    fn test_parse_transport_commands() {
        assert_eq!(Command::parse("play"), Ok(Command::Play));
        assert_eq!(Command::parse("PlayPause"), Ok(Command::PlayPause));
        assert_eq!(Command::parse("  next  "), Ok(Command::Next));
        assert_eq!(Command::parse("previous"), Ok(Command::Previous));
        assert_eq!(Command::parse("stop extra"), Ok(Command::Stop));
    }

    #[test]
    fn test_parse_set_position_sign() {
        assert_eq!(
            Command::parse("setposition 50"),
            Ok(Command::SetPosition { value: 50, relative: false })
        );
        assert_eq!(
            Command::parse("SetPosition +10"),
            Ok(Command::SetPosition { value: 10, relative: true })
        );
        assert_eq!(
            Command::parse("setposition -5"),
            Ok(Command::SetPosition { value: -5, relative: true })
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert_eq!(
            Command::parse("setposition"),
            Err(CommandError::MissingArgument("setposition".to_string()))
        );
        assert!(matches!(
            Command::parse("setposition half"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("setshuffle"),
            Err(CommandError::MissingArgument(_))
        ));
        assert!(matches!(
            Command::parse("setrepeat 3"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("setrepeat -2"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert_eq!(Command::parse("   "), Err(CommandError::Empty));
    }

    #[test]
    fn test_parse_unknown_and_legacy() {
        assert_eq!(
            Command::parse("frobnicate"),
            Err(CommandError::Unknown("frobnicate".to_string()))
        );
        assert_eq!(
            Command::parse("setvolume 5"),
            Ok(Command::Legacy(LegacyCommand::SetVolume))
        );
        assert_eq!(
            Command::parse("toggleplayer"),
            Ok(Command::Legacy(LegacyCommand::TogglePlayer))
        );
    }

    #[test]
    fn test_display_round_trips_sign() {
        let command = Command::SetPosition { value: 10, relative: true };
        assert_eq!(command.to_string(), "setposition +10");
        assert_eq!(command.to_string().parse::<Command>(), Ok(command));
    }

    #[tokio::test]
    async fn test_no_session_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = started(MockPlatform::new(), &dir).await;
        let commands = CommandTranslator::new(&cache);

        assert_eq!(commands.resolve(Command::Play), None);
        assert_eq!(commands.execute_line("next"), Ok(false));
        assert_eq!(commands.execute_line("setshuffle 1"), Ok(false));
    }

    #[tokio::test]
    async fn test_absolute_seek() {
        let dir = tempfile::tempdir().unwrap();
        let cache = started(MockPlatform::with_session(MockSession::new("p")), &dir).await;

        assert_eq!(
            CommandTranslator::new(&cache).resolve(Command::SetPosition {
                value: 50,
                relative: false,
            }),
            Some(TransportControl::Seek(Duration::from_secs(100)))
        );
    }

    #[tokio::test]
    async fn test_relative_seek() {
        let dir = tempfile::tempdir().unwrap();
        let cache = started(MockPlatform::with_session(MockSession::new("p")), &dir).await;

        assert_eq!(
            CommandTranslator::new(&cache).resolve(Command::parse("setposition +10").unwrap()),
            Some(TransportControl::Seek(Duration::from_secs(50)))
        );
        assert_eq!(
            CommandTranslator::new(&cache).resolve(Command::parse("setposition -50").unwrap()),
            Some(TransportControl::Seek(Duration::ZERO))
        );
    }

    #[tokio::test]
    async fn test_seek_is_offset_by_min_seek() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        session.set_timeline(TimelineProperties {
            min_seek: Duration::from_secs(10),
            max_seek: Duration::from_secs(110),
            position: Duration::from_secs(20),
        });
        cache.settled().await;

        assert_eq!(
            CommandTranslator::new(&cache).resolve(Command::SetPosition {
                value: 25,
                relative: false,
            }),
            Some(TransportControl::Seek(Duration::from_secs(35)))
        );
    }

    #[tokio::test]
    async fn test_seek_without_timeline_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        session.fail_timeline(true);
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;

        assert_eq!(CommandTranslator::new(&cache).execute_line("setposition 50"), Ok(false));
        assert_eq!(CommandTranslator::new(&cache).execute_line("play"), Ok(true));
    }

    #[tokio::test]
    async fn test_shuffle_toggle_flips_cached_flag() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        let commands = CommandTranslator::new(&cache);

        assert!(commands.execute_line("setshuffle -1").unwrap());
        cache.settled().await;
        assert!(commands.execute_line("setshuffle -1").unwrap());
        cache.settled().await;
        assert!(commands.execute_line("setshuffle 0").unwrap());
        assert!(commands.execute_line("setshuffle 7").unwrap());
        cache.settled().await;

        assert_eq!(
            session.sent(),
            vec![
                TransportControl::SetShuffle(true),
                TransportControl::SetShuffle(false),
                TransportControl::SetShuffle(false),
                TransportControl::SetShuffle(true),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeat_cycle_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        let commands = CommandTranslator::new(&cache);

        for _ in 0..6 {
            assert!(commands.execute_line("setrepeat -1").unwrap());
            cache.settled().await;
        }

        let modes: Vec<_> = session.sent();
        assert_eq!(
            modes,
            vec![
                TransportControl::SetRepeat(RepeatMode::Track),
                TransportControl::SetRepeat(RepeatMode::List),
                TransportControl::SetRepeat(RepeatMode::None),
                TransportControl::SetRepeat(RepeatMode::Track),
                TransportControl::SetRepeat(RepeatMode::List),
                TransportControl::SetRepeat(RepeatMode::None),
            ]
        );
    }

    #[tokio::test]
    async fn test_repeat_cycle_pivots_on_cached_mode() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        // The player ignores the requests, so the cached mode never moves
        session.echo_controls(false);
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        let commands = CommandTranslator::new(&cache);

        for _ in 0..3 {
            assert!(commands.execute_line("setrepeat -1").unwrap());
            cache.settled().await;
        }

        assert_eq!(
            session.sent(),
            vec![TransportControl::SetRepeat(RepeatMode::Track); 3]
        );
        assert_eq!(cache.playback_info().unwrap().repeat, Some(RepeatMode::None));
    }

    #[tokio::test]
    async fn test_repeat_direct_values() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        let commands = CommandTranslator::new(&cache);

        assert_eq!(
            commands.resolve(Command::SetRepeat(0)),
            Some(TransportControl::SetRepeat(RepeatMode::None))
        );
        assert_eq!(
            commands.resolve(Command::SetRepeat(1)),
            Some(TransportControl::SetRepeat(RepeatMode::List))
        );
        assert_eq!(
            commands.resolve(Command::SetRepeat(2)),
            Some(TransportControl::SetRepeat(RepeatMode::List))
        );
        assert_eq!(commands.resolve(Command::SetRepeat(5)), None);
    }

    #[tokio::test]
    async fn test_unknown_and_legacy_send_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        let commands = CommandTranslator::new(&cache);

        assert_eq!(
            commands.execute_line("frobnicate"),
            Err(CommandError::Unknown("frobnicate".to_string()))
        );
        assert_eq!(commands.execute_line("setvolume 5"), Ok(false));
        cache.settled().await;

        assert!(session.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transport_commands_map_one_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        let commands = CommandTranslator::new(&cache);

        for line in ["play", "pause", "playpause", "stop", "next", "previous"] {
            assert_eq!(commands.execute_line(line), Ok(true), "{}", line);
        }
        cache.settled().await;

        assert_eq!(
            session.sent(),
            vec![
                TransportControl::Play,
                TransportControl::Pause,
                TransportControl::TogglePlayPause,
                TransportControl::Stop,
                TransportControl::Next,
                TransportControl::Previous,
            ]
        );
    }

    #[tokio::test]
    async fn test_relative_seek_uses_latest_position() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("p");
        let cache = started(MockPlatform::with_session(session.clone()), &dir).await;
        session.set_timeline(sample_timeline(60, 200));
        cache.settled().await;

        assert_eq!(
            CommandTranslator::new(&cache).resolve(Command::SetPosition {
                value: 10,
                relative: true,
            }),
            Some(TransportControl::Seek(Duration::from_secs(80)))
        );
    }
}
