use thiserror::Error;

/// Errors from the cloud mirror client.
#[derive(Debug, Error)]
pub enum HexagonError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),
}
