use reqwest::Client;
use url::Url;

use super::error::HexagonError;
use super::types::{EpisodeFlagsBody, ShowUploadBody};
use crate::traits::{CloudService, EpisodeFlagUpload, ShowUpload};

/// Cloud mirror client.
pub struct HexagonClient {
    base: Url,
    auth_token: String,
    http: Client,
}

impl HexagonClient {
    pub fn new(base_url: &str, auth_token: String) -> Result<Self, HexagonError> {
        Ok(Self {
            base: Url::parse(base_url)?,
            auth_token,
            http: Client::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, HexagonError> {
        Ok(self.base.join(path)?)
    }

    /// Check the HTTP response for errors and return the body text on failure.
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, HexagonError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status, "hexagon API error");
            Err(HexagonError::Api {
                status,
                message: body,
            })
        }
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), HexagonError> {
        let resp = self
            .http
            .post(self.endpoint(path)?)
            .header("Authorization", format!("Bearer {}", self.auth_token))
            .json(body)
            .send()
            .await?;
        Self::check_response(resp).await?;
        Ok(())
    }
}

impl CloudService for HexagonClient {
    type Error = HexagonError;

    async fn upload_show(&self, show: &ShowUpload) -> Result<(), HexagonError> {
        self.post_json("shows", &ShowUploadBody { shows: [show] })
            .await
    }

    async fn upload_episode_flags(
        &self,
        show_id: i64,
        flags: &[EpisodeFlagUpload],
    ) -> Result<(), HexagonError> {
        self.post_json(
            "episodes",
            &EpisodeFlagsBody {
                show_id,
                episodes: flags,
            },
        )
        .await
    }
}
