//! Trait definitions for the remote services.
//!
//! The metadata source (tvdb), the social tracker (trakt) and the cloud
//! mirror (hexagon) each implement one of these, so the sync layer can be
//! exercised against mocks.

use std::collections::{HashMap, HashSet};
use std::future::Future;

/// A show as delivered by the metadata source, with all seasons and
/// episodes attached.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteShow {
    pub show_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster: Option<String>,
    pub network: Option<String>,
    pub release_time: Option<i64>,
    pub status: Option<String>,
    pub language: String,
    pub seasons: Vec<RemoteSeason>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteSeason {
    pub season_id: i64,
    pub number: i64,
    pub episodes: Vec<RemoteEpisode>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemoteEpisode {
    pub episode_id: i64,
    pub number: i64,
    pub absolute_number: Option<i64>,
    pub title: String,
    pub overview: Option<String>,
    /// Raw air-date text; resolution to milliseconds happens locally.
    pub first_released: Option<String>,
    pub rating: Option<f64>,
    pub last_edited_ms: i64,
}

/// Per-show sets of (season number, episode number), keyed by the show's
/// metadata-source id. Used to reconcile watched/collected state when
/// first adding a show.
pub type EpisodeStateMap = HashMap<i64, HashSet<(i64, i64)>>;

/// An episode addressed by numbers, never by local row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct EpisodeNumbers {
    pub season: i64,
    pub episode: i64,
}

/// One episode's flags as uploaded to the cloud mirror. Ratings are not
/// mirrored there.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EpisodeFlagUpload {
    pub season: i64,
    pub episode: i64,
    pub watched: i64,
    pub collected: bool,
}

/// A show's cloud-mirrored state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ShowUpload {
    pub show_id: i64,
    pub title: String,
    pub favorite: bool,
    pub hidden: bool,
    pub language: String,
}

/// The primary metadata source.
pub trait ShowMetadataService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a show with all seasons and episodes. `Ok(None)` means the
    /// show does not exist upstream.
    fn get_show(
        &self,
        show_id: i64,
        language: &str,
    ) -> impl Future<Output = Result<Option<RemoteShow>, Self::Error>> + Send;
}

/// The social tracking service.
pub trait TrackerService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// All episodes the user has watched, per show.
    fn watched_episodes(
        &self,
    ) -> impl Future<Output = Result<EpisodeStateMap, Self::Error>> + Send;

    /// All episodes the user has collected, per show.
    fn collected_episodes(
        &self,
    ) -> impl Future<Output = Result<EpisodeStateMap, Self::Error>> + Send;

    fn set_watched(
        &self,
        show_id: i64,
        episodes: &[EpisodeNumbers],
        watched: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn set_collected(
        &self,
        show_id: i64,
        episodes: &[EpisodeNumbers],
        collected: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn rate_episode(
        &self,
        show_id: i64,
        season: i64,
        episode: i64,
        rating: i64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// The cloud metadata/list mirror.
pub trait CloudService: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn upload_show(
        &self,
        show: &ShowUpload,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn upload_episode_flags(
        &self,
        show_id: i64,
        flags: &[EpisodeFlagUpload],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
