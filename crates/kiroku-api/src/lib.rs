pub mod hexagon;
pub mod traits;
pub mod trakt;
pub mod tvdb;
