//! Fields every persisted entity carries, independent of its domain shape
//! (`# 3 Storage Entity Common`).

use serde::{Deserialize, Serialize};

/// `Version` is the schema version stamped by the persistence mapper on
/// every write; `id` is the store-assigned primary key, used only as a
/// pagination cursor and otherwise opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageCommon {
    pub version: i64,
    pub id: Option<String>,
}

impl StorageCommon {
    pub const INITIAL_VERSION: i64 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::INITIAL_VERSION,
            id: None,
        }
    }
}

/// An informational, append-only status fact. Conditions are never used to
/// drive control flow; they exist for operators to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub last_transition_time: chrono::DateTime<chrono::Utc>,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            last_transition_time: at,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// A cursor-paginated page of items, returned by every Persistence Port
/// list operation (`# 6 Persistence Port`).
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continue_token: Option<String>,
    pub remaining_item_count: Option<i64>,
}

/// Options accepted by every paginated list operation.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub limit: Option<i64>,
    pub continue_token: Option<String>,
}

/// Appends a key/value pair to a sorted map used for selector matching,
/// keeping the map content-addressable (`# 4.1 ApplyRemoteConfig`,
/// `# 4.6` indexed-attribute convention).
pub type AttributeMap = std::collections::BTreeMap<String, String>;

/// Returns true when `subset`'s pairs are all present with equal values in
/// `superset` (the selector matching rule, `# GLOSSARY Selector`).
pub fn is_subset(subset: &AttributeMap, superset: &AttributeMap) -> bool {
    subset
        .iter()
        .all(|(k, v)| superset.get(k).map(|sv| sv == v).unwrap_or(false))
}
