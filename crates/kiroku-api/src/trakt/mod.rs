mod client;
mod error;
mod types;

pub use client::TraktClient;
pub use error::TraktError;
