use serde::{Deserialize, Serialize};

/// The kind of item a list entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Show,
    Season,
    Episode,
}

impl ItemType {
    pub fn as_db(self) -> i64 {
        match self {
            Self::Show => 1,
            Self::Season => 2,
            Self::Episode => 3,
        }
    }

    pub fn from_db(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Show),
            2 => Some(Self::Season),
            3 => Some(Self::Episode),
            _ => None,
        }
    }
}

/// Deterministic composite key for a list item.
///
/// The same (item id, item type, list id) inputs must always produce the
/// identical key so re-adds and remote merges stay idempotent.
pub fn list_item_key(item_ref_id: i64, item_type: ItemType, list_id: &str) -> String {
    format!("{item_ref_id}-{}-{list_id}", item_type.as_db())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List {
    pub list_id: String,
    pub name: String,
    pub list_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItem {
    pub list_item_id: String,
    pub item_ref_id: i64,
    pub item_type: ItemType,
    pub list_id: String,
}

impl ListItem {
    pub fn new(item_ref_id: i64, item_type: ItemType, list_id: impl Into<String>) -> Self {
        let list_id = list_id.into();
        Self {
            list_item_id: list_item_key(item_ref_id, item_type, &list_id),
            item_ref_id,
            item_type,
            list_id,
        }
    }
}
