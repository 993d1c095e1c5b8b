use serde::{Deserialize, Serialize};

/// A movie row, created on first reference and only removed explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Movie {
    pub movie_id: i64,
    pub title: String,
    pub in_collection: bool,
    pub in_watchlist: bool,
    pub watched: bool,
    pub plays: i64,
    /// Rating from the metadata source.
    pub rating_tmdb: Option<f64>,
    /// Rating from the tracking service.
    pub rating_trakt: Option<f64>,
    pub last_updated_ms: i64,
}
