use crate::traits::Thumbnail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Track metadata captured from the active session
#[derive(Clone, Debug, Default)]
pub struct MediaProperties {
    pub title: String,
    pub artist: String,
    pub album_title: String,
    pub genres: Vec<String>,
    pub track_number: i32,
    /// Opaque reference to the cover art, if the player published one
    pub thumbnail: Option<Arc<dyn Thumbnail>>,
}

impl MediaProperties {
    /// Genres joined the way skins expect them ("Rock, Blues")
    pub fn genre_list(&self) -> String {
        self.genres.join(", ")
    }
}

/// Playback status as reported by the platform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Closed,
    Opened,
    Changing,
    Stopped,
    Playing,
    Paused,
}

/// Repeat mode of the active session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    None,
    Track,
    List,
}

impl RepeatMode {
    /// Next mode in the none -> track -> list -> none cycle
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::None => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::List,
            RepeatMode::List => RepeatMode::None,
        }
    }

    pub fn as_number(self) -> f64 {
        match self {
            RepeatMode::None => 0.0,
            RepeatMode::Track => 1.0,
            RepeatMode::List => 2.0,
        }
    }
}

/// Playback state snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackInfo {
    pub status: PlaybackStatus,
    /// `None` when the player does not report shuffle
    pub shuffle: Option<bool>,
    /// `None` when the player does not report repeat
    pub repeat: Option<RepeatMode>,
}

impl PlaybackInfo {
    pub fn is_shuffle_active(&self) -> bool {
        self.shuffle.unwrap_or(false)
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat.unwrap_or_default()
    }
}

/// Timeline snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimelineProperties {
    pub min_seek: Duration,
    pub max_seek: Duration,
    pub position: Duration,
}

impl TimelineProperties {
    /// Seekable span of the current track
    pub fn duration(&self) -> Duration {
        self.max_seek.saturating_sub(self.min_seek)
    }
}

/// Formats a duration as `MM:SS`, minutes not wrapped at the hour
pub fn format_clock(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Transport requests the adapter can send to a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportControl {
    Play,
    Pause,
    TogglePlayPause,
    Stop,
    Next,
    Previous,
    /// Absolute position on the platform timeline
    Seek(Duration),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
}

/// Value a measure instance reports to the host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryField {
    Artist,
    Album,
    #[default]
    Title,
    Genre,
    Cover,
    Number,
    Duration,
    Position,
    Progress,
    Repeat,
    Shuffle,
    State,
    Status,
    Rating,
}

impl QueryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryField::Artist => "artist",
            QueryField::Album => "album",
            QueryField::Title => "title",
            QueryField::Genre => "genre",
            QueryField::Cover => "cover",
            QueryField::Number => "number",
            QueryField::Duration => "duration",
            QueryField::Position => "position",
            QueryField::Progress => "progress",
            QueryField::Repeat => "repeat",
            QueryField::Shuffle => "shuffle",
            QueryField::State => "state",
            QueryField::Status => "status",
            QueryField::Rating => "rating",
        }
    }

    /// Whether the field has a string form the host should display
    pub fn has_text(&self) -> bool {
        matches!(
            self,
            QueryField::Artist
                | QueryField::Album
                | QueryField::Title
                | QueryField::Genre
                | QueryField::Cover
                | QueryField::Duration
                | QueryField::Position
        )
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for unknown field keys
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid player type: {0}")]
pub struct FieldParseError(pub String);

impl FromStr for QueryField {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "artist" => Ok(QueryField::Artist),
            "album" => Ok(QueryField::Album),
            "title" => Ok(QueryField::Title),
            "genre" => Ok(QueryField::Genre),
            "cover" => Ok(QueryField::Cover),
            "number" => Ok(QueryField::Number),
            "duration" => Ok(QueryField::Duration),
            "position" => Ok(QueryField::Position),
            "progress" => Ok(QueryField::Progress),
            "repeat" => Ok(QueryField::Repeat),
            "shuffle" => Ok(QueryField::Shuffle),
            "state" => Ok(QueryField::State),
            "status" => Ok(QueryField::Status),
            "rating" => Ok(QueryField::Rating),
            _ => Err(FieldParseError(s.to_string())),
        }
    }
}
