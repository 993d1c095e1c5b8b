pub mod config;
pub mod counters;
pub mod error;
pub mod models;
pub mod resource;
pub mod schema;
pub mod search;
pub mod select;
pub mod store;
