use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

/// Tri-state watched flag for an episode.
///
/// These three values are the only ones that may ever reach storage;
/// anything else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchedFlag {
    Unwatched,
    Watched,
    Skipped,
}

impl WatchedFlag {
    pub const ALL: &[WatchedFlag] = &[Self::Unwatched, Self::Watched, Self::Skipped];

    /// Database integer representation.
    pub fn as_db(self) -> i64 {
        match self {
            Self::Unwatched => 0,
            Self::Watched => 1,
            Self::Skipped => 2,
        }
    }

    pub fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Unwatched),
            1 => Some(Self::Watched),
            2 => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether this value counts toward a season's watched counter.
    pub fn counts_as_watched(self) -> bool {
        matches!(self, Self::Watched)
    }
}

impl std::fmt::Display for WatchedFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unwatched => write!(f, "unwatched"),
            Self::Watched => write!(f, "watched"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A show in the local catalog, keyed by its remote id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Show {
    pub show_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster: Option<String>,
    pub network: Option<String>,
    /// Release time encoded as minutes past midnight, if known.
    pub release_time: Option<i64>,
    pub status: Option<String>,
    pub favorite: bool,
    pub hidden: bool,
    pub sync_enabled: bool,
    /// Next episode to watch; empty or an episode of this show.
    pub next_episode_id: Option<i64>,
    /// Most recently watched episode; empty or an episode of this show.
    pub last_watched_episode_id: Option<i64>,
    pub last_updated_ms: i64,
    pub last_edited_ms: i64,
    pub language: String,
}

/// A season with its denormalized counters.
///
/// The counters are cache, not source of truth: they must always equal a
/// fresh recount of the episode rows underneath (see `counters`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Season {
    pub season_id: i64,
    pub season_number: i64,
    pub show_id: i64,
    pub watched_count: i64,
    pub unaired_count: i64,
    pub noairdate_count: i64,
    pub total_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub episode_id: i64,
    pub season_number: i64,
    pub episode_number: i64,
    pub absolute_number: Option<i64>,
    pub season_id: i64,
    pub show_id: i64,
    pub title: String,
    pub overview: Option<String>,
    /// Raw air-date text as delivered by the metadata source.
    pub first_released: Option<String>,
    /// Air date resolved to epoch milliseconds, -1 when unknown.
    pub released_ms: i64,
    pub watched: WatchedFlag,
    pub collected: bool,
    pub rating_global: Option<f64>,
    pub rating_user: Option<i64>,
    pub plays: i64,
    pub last_edited_ms: i64,
}

impl Default for Episode {
    fn default() -> Self {
        Self {
            episode_id: 0,
            season_number: 0,
            episode_number: 0,
            absolute_number: None,
            season_id: 0,
            show_id: 0,
            title: String::new(),
            overview: None,
            first_released: None,
            released_ms: -1,
            watched: WatchedFlag::Unwatched,
            collected: false,
            rating_global: None,
            rating_user: None,
            plays: 0,
            last_edited_ms: 0,
        }
    }
}

/// Resolve raw air-date text to epoch milliseconds, -1 when absent or
/// unparseable. Accepts RFC 3339 or a bare `YYYY-MM-DD` date.
pub fn resolve_release_ms(raw: Option<&str>) -> i64 {
    let Some(s) = raw else { return -1 };
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_millis();
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return dt.and_utc().timestamp_millis();
        }
    }
    -1
}
