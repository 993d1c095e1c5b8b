mod client;
mod error;
mod types;

pub use client::TvdbClient;
pub use error::TvdbError;
