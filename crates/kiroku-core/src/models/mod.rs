mod list;
mod movie;
mod show;

pub use list::{list_item_key, ItemType, List, ListItem};
pub use movie::Movie;
pub use show::{resolve_release_ms, Episode, Season, Show, WatchedFlag};
