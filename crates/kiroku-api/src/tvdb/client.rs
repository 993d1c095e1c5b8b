use reqwest::{Client, StatusCode};

use super::error::TvdbError;
use super::types::{EpisodeData, EpisodesResponse, SeriesResponse};
use crate::traits::{RemoteShow, ShowMetadataService};

const BASE_URL: &str = "https://api.thetvdb.com";

/// Metadata-source client.
pub struct TvdbClient {
    api_key: String,
    http: Client,
}

impl TvdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: Client::new(),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Check the HTTP response for errors and return the body text on failure.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, TvdbError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status, "tvdb API error");
            Err(TvdbError::Api {
                status,
                message: body,
            })
        }
    }

    async fn fetch_series(
        &self,
        show_id: i64,
        language: &str,
    ) -> Result<Option<SeriesResponse>, TvdbError> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/series/{show_id}"))
            .header("Authorization", self.auth_header())
            .header("Accept-Language", language)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = Self::check_response(resp).await?;
        let series: SeriesResponse = resp
            .json()
            .await
            .map_err(|e| TvdbError::Parse(e.to_string()))?;
        Ok(Some(series))
    }

    async fn fetch_episodes(
        &self,
        show_id: i64,
        language: &str,
    ) -> Result<Vec<EpisodeData>, TvdbError> {
        let mut episodes = Vec::new();
        let mut page: i64 = 1;

        loop {
            let resp = self
                .http
                .get(format!("{BASE_URL}/series/{show_id}/episodes"))
                .header("Authorization", self.auth_header())
                .header("Accept-Language", language)
                .query(&[("page", page.to_string())])
                .send()
                .await?;

            // A show with zero episodes reports 404 on the episodes route.
            if resp.status() == StatusCode::NOT_FOUND {
                return Ok(episodes);
            }
            let resp = Self::check_response(resp).await?;
            let body: EpisodesResponse = resp
                .json()
                .await
                .map_err(|e| TvdbError::Parse(e.to_string()))?;

            episodes.extend(body.data);

            match body.links.next {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(episodes)
    }
}

impl ShowMetadataService for TvdbClient {
    type Error = TvdbError;

    async fn get_show(
        &self,
        show_id: i64,
        language: &str,
    ) -> Result<Option<RemoteShow>, TvdbError> {
        let Some(series) = self.fetch_series(show_id, language).await? else {
            return Ok(None);
        };
        let episodes = self.fetch_episodes(show_id, language).await?;
        Ok(Some(series.data.into_remote_show(language, episodes)))
    }
}
