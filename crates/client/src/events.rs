//! Change notifications emitted by the [`LockStore`](crate::store::LockStore).
//!
//! Views subscribe to re-render when lock state changes; the store never
//! waits on subscribers.

use courseport_core::types::{ContentId, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub enum LockEvent {
    /// A full fetch replaced the whole lock map.
    Replaced {
        count: usize,
        last_updated: Option<Timestamp>,
    },

    /// Entries were written optimistically, ahead of server confirmation.
    Patched { content_ids: Vec<ContentId> },

    /// The server confirmed a single-item update.
    Confirmed { content_id: ContentId, locked: bool },

    /// Optimistic entries were rolled back after a failed write.
    Reverted { content_ids: Vec<ContentId> },

    /// An operation failed; the message is also in the store's error slot.
    Failed { message: String },

    /// The cache returned to the fail-safe defaults.
    Reset,
}

impl LockEvent {
    /// Whether the event changes what the sidebar shows.
    pub fn affects_locks(&self) -> bool {
        !matches!(self, LockEvent::Failed { .. })
    }
}
