mod client;
mod error;
mod types;

pub use client::HexagonClient;
pub use error::HexagonError;
