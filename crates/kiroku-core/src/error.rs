use thiserror::Error;

/// Errors surfaced by the data-access layer.
///
/// Connectivity and remote-service kinds belong to the sync layer
/// (`kiroku-sync`), which wraps this type; everything here is local.
#[derive(Debug, Error)]
pub enum KirokuError {
    /// Rejected before any I/O; never retried automatically.
    #[error("validation error: {0}")]
    Validation(String),

    /// Local store failure; the most severe outcome, never masked.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
