//! Versioned codec for the durable subset of the lock cache.
//!
//! Only `lockedItems` and `lastUpdated` are persisted. The on-disk shape is
//!
//! ```json
//! { "version": 1, "state": { "lockedItems": { "day2": true }, "lastUpdated": "..." } }
//! ```
//!
//! Anything that does not decode cleanly is treated as "no snapshot", so a
//! damaged file degrades to the fail-safe default instead of an error.

use serde::{Deserialize, Serialize};

use courseport_core::locks::{LockCache, LockMap};
use courseport_core::types::{lenient_timestamp, Timestamp};

use crate::error::{ClientError, ClientResult};
use crate::storage::{KeyValueStorage, LOCK_STORAGE_KEY};

/// Current schema version of the persisted lock snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// The persisted fields of a [`LockCache`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLocks {
    pub locked_items: LockMap,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<Timestamp>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u32,
    state: PersistedLocks,
}

impl From<&LockCache> for PersistedLocks {
    fn from(cache: &LockCache) -> Self {
        Self {
            locked_items: cache.locked_items.clone(),
            last_updated: cache.last_updated,
        }
    }
}

impl From<PersistedLocks> for LockCache {
    fn from(persisted: PersistedLocks) -> Self {
        LockCache::from_persisted(persisted.locked_items, persisted.last_updated)
    }
}

/// Serialize the durable fields of `cache`.
pub fn encode_snapshot(cache: &LockCache) -> ClientResult<String> {
    let envelope = SnapshotEnvelope {
        version: SNAPSHOT_VERSION,
        state: PersistedLocks::from(cache),
    };
    serde_json::to_string(&envelope).map_err(|e| ClientError::Storage(e.to_string()))
}

/// Decode a stored snapshot. Returns `None` for unknown versions or
/// malformed payloads.
pub fn decode_snapshot(raw: &str) -> Option<PersistedLocks> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Lock snapshot is not valid JSON, ignoring");
            return None;
        }
    };

    let version = value.get("version").and_then(|v| v.as_u64());
    if version != Some(u64::from(SNAPSHOT_VERSION)) {
        tracing::warn!(?version, expected = SNAPSHOT_VERSION, "Unsupported lock snapshot version, ignoring");
        return None;
    }

    match serde_json::from_value::<SnapshotEnvelope>(value) {
        Ok(envelope) => Some(envelope.state),
        Err(e) => {
            tracing::warn!(error = %e, "Lock snapshot has unexpected shape, ignoring");
            None
        }
    }
}

/// Load the lock cache from storage, falling back to the fail-safe default.
pub fn load_cache(storage: &dyn KeyValueStorage) -> LockCache {
    match storage.get(LOCK_STORAGE_KEY) {
        Ok(Some(raw)) => decode_snapshot(&raw)
            .map(LockCache::from)
            .unwrap_or_else(LockCache::fail_safe),
        Ok(None) => LockCache::fail_safe(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read lock snapshot, using defaults");
            LockCache::fail_safe()
        }
    }
}
