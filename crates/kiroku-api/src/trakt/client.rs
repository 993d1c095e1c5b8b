use reqwest::Client;

use super::error::TraktError;
use super::types::{into_state_map, SyncShows, WatchedShow};
use crate::traits::{EpisodeNumbers, EpisodeStateMap, TrackerService};

const BASE_URL: &str = "https://api.trakt.tv";

/// Social tracker client (trakt API v2).
pub struct TraktClient {
    client_id: String,
    access_token: String,
    http: Client,
}

impl TraktClient {
    pub fn new(client_id: String, access_token: String) -> Self {
        Self {
            client_id,
            access_token,
            http: Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{BASE_URL}{path}"))
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("trakt-api-version", "2")
            .header("trakt-api-key", self.client_id.clone())
    }

    /// Check the HTTP response for errors and return the body text on failure.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, TraktError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status, "trakt API error");
            Err(TraktError::Api {
                status,
                message: body,
            })
        }
    }

    async fn fetch_state(&self, path: &str) -> Result<EpisodeStateMap, TraktError> {
        let resp = self.request(reqwest::Method::GET, path).send().await?;
        let resp = Self::check_response(resp).await?;
        let shows: Vec<WatchedShow> = resp
            .json()
            .await
            .map_err(|e| TraktError::Parse(e.to_string()))?;
        Ok(into_state_map(shows))
    }

    async fn post_sync(&self, path: &str, body: &SyncShows) -> Result<(), TraktError> {
        let resp = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await?;
        Self::check_response(resp).await?;
        Ok(())
    }
}

impl TrackerService for TraktClient {
    type Error = TraktError;

    async fn watched_episodes(&self) -> Result<EpisodeStateMap, TraktError> {
        self.fetch_state("/sync/watched/shows").await
    }

    async fn collected_episodes(&self) -> Result<EpisodeStateMap, TraktError> {
        self.fetch_state("/sync/collection/shows").await
    }

    async fn set_watched(
        &self,
        show_id: i64,
        episodes: &[EpisodeNumbers],
        watched: bool,
    ) -> Result<(), TraktError> {
        let path = if watched {
            "/sync/history"
        } else {
            "/sync/history/remove"
        };
        self.post_sync(path, &SyncShows::for_episodes(show_id, episodes))
            .await
    }

    async fn set_collected(
        &self,
        show_id: i64,
        episodes: &[EpisodeNumbers],
        collected: bool,
    ) -> Result<(), TraktError> {
        let path = if collected {
            "/sync/collection"
        } else {
            "/sync/collection/remove"
        };
        self.post_sync(path, &SyncShows::for_episodes(show_id, episodes))
            .await
    }

    async fn rate_episode(
        &self,
        show_id: i64,
        season: i64,
        episode: i64,
        rating: i64,
    ) -> Result<(), TraktError> {
        self.post_sync(
            "/sync/ratings",
            &SyncShows::for_rating(show_id, season, episode, rating),
        )
        .await
    }
}
