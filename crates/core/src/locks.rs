//! Content-lock records and the client-side lock cache.
//!
//! [`LockRecord`] and [`HistoryEntry`] mirror what the lock service
//! returns. [`LockCache`] is the client's view of lock state: a map from
//! content id to a locked flag plus freshness and transient status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{lenient_timestamp, ContentId, Timestamp};

/// Items locked before any server data has been seen.
pub const FAIL_SAFE_LOCKED: &[&str] = &["day2", "day3"];

/// Content id -> locked flag.
pub type LockMap = BTreeMap<ContentId, bool>;

// ---------------------------------------------------------------------------
// Server records
// ---------------------------------------------------------------------------

/// A user referenced by the lock service for audit attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Server-owned lock state for a single content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Server row id; absent from single-update confirmations.
    #[serde(default)]
    pub id: Option<String>,
    pub content_id: ContentId,
    pub is_locked: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub locked_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub unlocked_at: Option<Timestamp>,
    #[serde(default)]
    pub created_by: Option<ActorRef>,
    #[serde(default)]
    pub updated_by: Option<ActorRef>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<Timestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<Timestamp>,
}

/// One requested change in a batch update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockUpdate {
    pub content_id: ContentId,
    pub is_locked: bool,
}

impl LockUpdate {
    pub fn new(content_id: impl Into<ContentId>, is_locked: bool) -> Self {
        Self {
            content_id: content_id.into(),
            is_locked,
        }
    }
}

/// Direction of a lock transition in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockAction {
    Locked,
    Unlocked,
}

/// One entry of a content item's lock audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub content_id: ContentId,
    pub action: LockAction,
    pub performed_by: ActorRef,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// LockCache
// ---------------------------------------------------------------------------

/// Client-side cache of lock state.
///
/// `locked_items` and `last_updated` are durable; `is_loading` and `error`
/// are transient and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LockCache {
    pub locked_items: LockMap,
    pub last_updated: Option<Timestamp>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl LockCache {
    /// The conservative first-paint state: [`FAIL_SAFE_LOCKED`] items locked.
    pub fn fail_safe() -> Self {
        Self {
            locked_items: FAIL_SAFE_LOCKED
                .iter()
                .map(|id| (id.to_string(), true))
                .collect(),
            last_updated: None,
            is_loading: false,
            error: None,
        }
    }

    /// Restore a cache from its durable fields.
    pub fn from_persisted(locked_items: LockMap, last_updated: Option<Timestamp>) -> Self {
        Self {
            locked_items,
            last_updated,
            is_loading: false,
            error: None,
        }
    }

    /// Whether `id` is locked. Ids absent from the map are unlocked.
    pub fn is_item_locked(&self, id: &str) -> bool {
        self.locked_items.get(id).copied().unwrap_or(false)
    }

    /// Whether the map holds any entries at all. When it does, the map
    /// overrides the navigation tree's static defaults wholesale.
    pub fn has_server_data(&self) -> bool {
        !self.locked_items.is_empty()
    }
}

impl Default for LockCache {
    fn default() -> Self {
        Self::fail_safe()
    }
}
