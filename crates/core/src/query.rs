//! Field lookups against the cached snapshots
//!
//! Reads never wait on the platform and never fail: anything missing or not
//! computable degrades to `""` or `0.0`.

use crate::cache::SessionCache;
use crate::models::{format_clock, PlaybackStatus, QueryField};

/// Translates a [`QueryField`] into the value a measure reports
pub struct QueryTranslator<'a> {
    cache: &'a SessionCache,
    default_cover: Option<&'a str>,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(cache: &'a SessionCache) -> Self {
        Self {
            cache,
            default_cover: None,
        }
    }

    /// Path reported by the cover field when no extracted cover exists
    pub fn with_default_cover(mut self, path: Option<&'a str>) -> Self {
        self.default_cover = path.filter(|p| !p.is_empty());
        self
    }

    /// Numeric value of `field`; always finite
    pub fn number(&self, field: QueryField) -> f64 {
        let value = self.raw_number(field).unwrap_or(0.0);
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    /// String value of `field`; empty when there is nothing to show
    pub fn string(&self, field: QueryField) -> String {
        if field == QueryField::Cover {
            return self.cover();
        }
        self.raw_string(field).unwrap_or_default()
    }

    fn raw_number(&self, field: QueryField) -> Option<f64> {
        match field {
            QueryField::Number => self
                .cache
                .media_properties()
                .map(|media| f64::from(media.track_number)),
            QueryField::Duration => self
                .cache
                .timeline()
                .map(|timeline| timeline.duration().as_secs_f64()),
            QueryField::Position => self
                .cache
                .timeline()
                .map(|timeline| timeline.position.as_secs_f64()),
            QueryField::Progress => self.cache.timeline().map(|timeline| {
                // 0/0 is NaN here; `number` maps it to 0
                timeline.position.as_secs_f64() * 100.0 / timeline.duration().as_secs_f64()
            }),
            QueryField::Repeat => self
                .cache
                .playback_info()
                .map(|info| info.repeat_mode().as_number()),
            QueryField::Shuffle => self
                .cache
                .playback_info()
                .map(|info| if info.is_shuffle_active() { 1.0 } else { 0.0 }),
            QueryField::State => self.cache.playback_info().map(|info| match info.status {
                PlaybackStatus::Playing => 1.0,
                PlaybackStatus::Paused => 2.0,
                _ => 0.0,
            }),
            QueryField::Status => Some(if self.cache.session().is_some() { 1.0 } else { 0.0 }),
            QueryField::Rating => Some(0.0),
            QueryField::Artist
            | QueryField::Album
            | QueryField::Title
            | QueryField::Genre
            | QueryField::Cover => None,
        }
    }

    fn raw_string(&self, field: QueryField) -> Option<String> {
        match field {
            QueryField::Artist => self.cache.media_properties().map(|m| m.artist.clone()),
            QueryField::Album => self.cache.media_properties().map(|m| m.album_title.clone()),
            QueryField::Title => self.cache.media_properties().map(|m| m.title.clone()),
            QueryField::Genre => self.cache.media_properties().map(|m| m.genre_list()),
            QueryField::Duration => self.cache.timeline().map(|t| format_clock(t.duration())),
            QueryField::Position => self.cache.timeline().map(|t| format_clock(t.position)),
            _ => None,
        }
    }

    fn cover(&self) -> String {
        let cover = self.cache.cover();
        if cover.is_available() {
            return cover.path().to_string_lossy().into_owned();
        }
        self.default_cover.unwrap_or_default().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::CoverStore;
    use crate::models::{PlaybackInfo, RepeatMode};
    use crate::test_utils::{sample_timeline, MockPlatform, MockSession, MockThumbnail};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Handle;

    const ALL_FIELDS: [QueryField; 14] = [
        QueryField::Artist,
        QueryField::Album,
        QueryField::Title,
        QueryField::Genre,
        QueryField::Cover,
        QueryField::Number,
        QueryField::Duration,
        QueryField::Position,
        QueryField::Progress,
        QueryField::Repeat,
        QueryField::Shuffle,
        QueryField::State,
        QueryField::Status,
        QueryField::Rating,
    ];

    async fn started(session: Arc<MockSession>, dir: &tempfile::TempDir) -> Arc<SessionCache> {
        let cover = CoverStore::in_dir(dir.path(), "cover.png").unwrap();
        let platform = MockPlatform::with_session(session);
        let cache = SessionCache::new(platform, cover, Handle::current());
        cache.start().await.unwrap();
        cache.settled().await;
        cache
    }

    #[tokio::test]
    async fn test_defaults_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let cover = CoverStore::in_dir(dir.path(), "cover.png").unwrap();
        let cache = SessionCache::new(MockPlatform::new(), cover, Handle::current());
        let query = QueryTranslator::new(&cache);

        for field in ALL_FIELDS {
            assert_eq!(query.number(field), 0.0, "{}", field);
            assert_eq!(query.string(field), "", "{}", field);
        }
    }

    #[tokio::test]
    async fn test_text_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = started(MockSession::new("player"), &dir).await;
        let query = QueryTranslator::new(&cache);

        assert_eq!(query.string(QueryField::Artist), "Pink Floyd");
        assert_eq!(query.string(QueryField::Album), "The Dark Side of the Moon");
        assert_eq!(query.string(QueryField::Title), "Time");
        assert_eq!(query.string(QueryField::Genre), "Rock, Progressive");
        assert_eq!(query.string(QueryField::Duration), "03:20");
        assert_eq!(query.string(QueryField::Position), "00:30");
        assert_eq!(query.string(QueryField::Progress), "");
        assert_eq!(query.number(QueryField::Title), 0.0);
    }

    #[tokio::test]
    async fn test_numeric_fields() {
        let dir = tempfile::tempdir().unwrap();
        let cache = started(MockSession::new("player"), &dir).await;
        let query = QueryTranslator::new(&cache);

        assert_eq!(query.number(QueryField::Number), 4.0);
        assert_eq!(query.number(QueryField::Duration), 200.0);
        assert_eq!(query.number(QueryField::Position), 30.0);
        assert_eq!(query.number(QueryField::Progress), 15.0);
        assert_eq!(query.number(QueryField::Repeat), 0.0);
        assert_eq!(query.number(QueryField::Shuffle), 0.0);
        assert_eq!(query.number(QueryField::State), 1.0);
        assert_eq!(query.number(QueryField::Status), 1.0);
        assert_eq!(query.number(QueryField::Rating), 0.0);
    }

    #[tokio::test]
    async fn test_playback_mappings() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("player");
        let cache = started(session.clone(), &dir).await;

        session.set_playback(PlaybackInfo {
            status: PlaybackStatus::Paused,
            shuffle: Some(true),
            repeat: Some(RepeatMode::List),
        });
        cache.settled().await;

        let query = QueryTranslator::new(&cache);
        assert_eq!(query.number(QueryField::State), 2.0);
        assert_eq!(query.number(QueryField::Shuffle), 1.0);
        assert_eq!(query.number(QueryField::Repeat), 2.0);

        session.set_playback(PlaybackInfo {
            status: PlaybackStatus::Stopped,
            shuffle: None,
            repeat: Some(RepeatMode::Track),
        });
        cache.settled().await;
        assert_eq!(query.number(QueryField::State), 0.0);
        assert_eq!(query.number(QueryField::Shuffle), 0.0);
        assert_eq!(query.number(QueryField::Repeat), 1.0);
    }

    #[tokio::test]
    async fn test_progress_with_zero_span_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("player");
        let cache = started(session.clone(), &dir).await;

        session.set_timeline(sample_timeline(0, 0));
        cache.settled().await;
        assert_eq!(QueryTranslator::new(&cache).number(QueryField::Progress), 0.0);

        // Position past an empty span would be +inf
        session.set_timeline(sample_timeline(10, 0));
        cache.settled().await;
        assert_eq!(QueryTranslator::new(&cache).number(QueryField::Progress), 0.0);
    }

    #[tokio::test]
    async fn test_duration_subtracts_min_seek() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("player");
        let cache = started(session.clone(), &dir).await;

        session.set_timeline(crate::models::TimelineProperties {
            min_seek: Duration::from_secs(5),
            max_seek: Duration::from_secs(65),
            position: Duration::from_secs(20),
        });
        cache.settled().await;

        let query = QueryTranslator::new(&cache);
        assert_eq!(query.number(QueryField::Duration), 60.0);
        assert_eq!(query.string(QueryField::Duration), "01:00");
    }

    #[tokio::test]
    async fn test_cover_path_when_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = started(MockSession::new("player"), &dir).await;

        let path = QueryTranslator::new(&cache)
            .with_default_cover(Some("default.png"))
            .string(QueryField::Cover);
        assert_eq!(path, dir.path().join("cover.png").to_string_lossy());
    }

    #[tokio::test]
    async fn test_cover_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new("player");
        let mut media = crate::test_utils::sample_media();
        media.thumbnail = Some(Arc::new(MockThumbnail::failing()));
        session.set_media(media);
        let cache = started(session, &dir).await;

        assert!(!cache.cover().is_available());
        assert_eq!(QueryTranslator::new(&cache).string(QueryField::Cover), "");
        assert_eq!(
            QueryTranslator::new(&cache)
                .with_default_cover(Some("C:\\Skins\\nocover.png"))
                .string(QueryField::Cover),
            "C:\\Skins\\nocover.png"
        );
        assert_eq!(
            QueryTranslator::new(&cache)
                .with_default_cover(Some(""))
                .string(QueryField::Cover),
            ""
        );
    }
}
