//! Per-instance measure state

use crate::host::{to_wide, HostApi, LogLevel};
use nowplaying_core::{Command, CommandTranslator, QueryField, QueryTranslator, SessionCache};
use std::sync::Arc;
use tracing::debug;

/// One measure section of a skin
pub struct Measure {
    host: Arc<dyn HostApi>,
    field: QueryField,
    default_cover: String,
    /// Backing storage for the last string handed to the host
    buffer: Vec<u16>,
}

impl Measure {
    pub fn new(host: Arc<dyn HostApi>) -> Self {
        Self {
            host,
            field: QueryField::default(),
            default_cover: String::new(),
            buffer: Vec::new(),
        }
    }

    /// Re-read `PlayerType` and `DefaultCoverPath`
    pub fn reload(&mut self) {
        let player_type = self.host.read_string("PlayerType", "Title");
        self.field = match player_type.parse() {
            Ok(field) => field,
            Err(e) => {
                self.host.log(
                    LogLevel::Error,
                    &format!("NowPlaying.dll: Invalid PlayerType={}", player_type),
                );
                debug!("{}", e);
                QueryField::Title
            }
        };

        self.default_cover = if self.field == QueryField::Cover {
            self.host.read_path("DefaultCoverPath", "")
        } else {
            String::new()
        };
    }

    /// Numeric value; 0 without a cache
    pub fn update(&self, cache: Option<&SessionCache>) -> f64 {
        cache.map_or(0.0, |cache| self.query(cache).number(self.field))
    }

    /// NUL-terminated UTF-16 value, `None` for fields without a string form.
    ///
    /// The slice stays valid until the next call on this measure.
    pub fn string(&mut self, cache: Option<&SessionCache>) -> Option<&[u16]> {
        if !self.field.has_text() {
            return None;
        }

        let text = match cache {
            Some(cache) => self.query(cache).string(self.field),
            None if self.field == QueryField::Cover => self.default_cover.clone(),
            None => String::new(),
        };
        self.buffer = to_wide(&text);
        Some(&self.buffer)
    }

    /// Run a bang; invalid commands are reported to the host log even when
    /// media sessions are unavailable
    pub fn execute(&self, cache: Option<&SessionCache>, args: &str) {
        let command = match Command::parse(args) {
            Ok(command) => command,
            Err(e) => {
                self.host.log(
                    LogLevel::Error,
                    &format!("NowPlaying.dll: Invalid command: {}", args),
                );
                debug!("{}", e);
                return;
            }
        };

        match cache {
            Some(cache) => {
                CommandTranslator::new(cache).execute(command);
            }
            None => debug!("Ignoring '{}': media sessions unavailable", command),
        }
    }

    fn query<'a>(&'a self, cache: &'a SessionCache) -> QueryTranslator<'a> {
        QueryTranslator::new(cache).with_default_cover(Some(&self.default_cover))
    }
}
