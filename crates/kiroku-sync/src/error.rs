use kiroku_core::error::KirokuError;
use thiserror::Error;

/// Errors surfaced by the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("offline")]
    Offline,

    #[error("{service}: {message}")]
    Remote {
        service: &'static str,
        message: String,
    },

    #[error(transparent)]
    Storage(#[from] KirokuError),
}
