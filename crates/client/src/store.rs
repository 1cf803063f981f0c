//! Lock store: the client's single source of truth for content-lock state.
//!
//! [`LockStore`] owns a [`LockCache`] and mediates every read and write.
//! It is constructed once at startup (restoring the persisted snapshot),
//! shared as `Arc<LockStore>`, and reset explicitly on logout.
//!
//! Write paths:
//!
//! - [`fetch_locks`](LockStore::fetch_locks) replaces the map wholesale on
//!   success and leaves it untouched on failure. It never returns an error;
//!   failures land in the error slot.
//! - [`update_lock`](LockStore::update_lock) patches optimistically, then
//!   applies the server's record or rolls the patch back.
//! - [`batch_update_locks`](LockStore::batch_update_locks) patches
//!   optimistically, then always re-fetches, because a failed batch may
//!   have been partially applied server-side.
//!
//! The durable subset is encoded after every mutation and written to
//! storage once the state lock is released. Writes carry a sequence number
//! and an older snapshot never overwrites a newer one.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use courseport_core::locks::{LockCache, LockRecord, LockUpdate};
use courseport_core::types::{validate_content_id, ContentId, Timestamp};

use crate::api::LockTransport;
use crate::auth::AuthStatus;
use crate::error::{ClientError, ClientResult};
use crate::events::LockEvent;
use crate::snapshot::{encode_snapshot, load_cache};
use crate::storage::{KeyValueStorage, LOCK_STORAGE_KEY};

/// Broadcast channel capacity for lock events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Mutable store state behind the lock.
struct StoreState {
    cache: LockCache,
    /// Operations currently awaiting the network. `is_loading` mirrors
    /// `in_flight > 0`.
    in_flight: usize,
    /// Ticket handed to the most recently started fetch.
    issued_ticket: u64,
    /// Ticket of the fetch whose result is currently applied. Responses
    /// with a lower ticket are stale and dropped.
    applied_ticket: u64,
    /// Bumped by `reset`. Writes that started in an earlier epoch do not
    /// touch the cache when they complete.
    epoch: u64,
    /// Sequence number of the most recently staged snapshot write.
    staged_seq: u64,
}

impl StoreState {
    fn begin(&mut self) {
        self.in_flight += 1;
        self.cache.is_loading = true;
    }

    fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.cache.is_loading = self.in_flight > 0;
    }

    fn advance_last_updated(&mut self, ts: Option<Timestamp>) {
        if let Some(ts) = ts {
            if self.cache.last_updated.is_none_or(|current| ts > current) {
                self.cache.last_updated = Some(ts);
            }
        }
    }

    /// Encode the durable subset for writing after the lock is released.
    fn stage_save(&mut self) -> Option<StagedWrite> {
        match encode_snapshot(&self.cache) {
            Ok(raw) => Some(self.stage(SnapshotWrite::Save(raw))),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode lock snapshot");
                None
            }
        }
    }

    fn stage(&mut self, write: SnapshotWrite) -> StagedWrite {
        self.staged_seq += 1;
        StagedWrite {
            seq: self.staged_seq,
            write,
        }
    }
}

enum SnapshotWrite {
    Save(String),
    Remove,
}

/// A snapshot write captured under the state lock.
struct StagedWrite {
    seq: u64,
    write: SnapshotWrite,
}

/// An optimistic write waiting for the server's answer.
struct PendingWrite {
    patch: OptimisticPatch,
    /// Store epoch when the patch was applied.
    epoch: u64,
    /// Last fetch ticket issued before the patch was applied. A fetch with
    /// a higher ticket that has been applied already reflects the server's
    /// answer to this write.
    fetch_mark: u64,
}

impl PendingWrite {
    /// Undo the patch unless a later full fetch has already replaced it.
    fn rollback(self, state: &mut StoreState) -> Vec<ContentId> {
        if state.applied_ticket > self.fetch_mark {
            tracing::debug!(applied = state.applied_ticket, "Newer fetch already applied, keeping server state");
            return Vec::new();
        }
        self.patch.rollback(&mut state.cache)
    }
}

/// Prior values of the entries touched by an optimistic write.
struct OptimisticPatch {
    /// `(content_id, prior value, value written)`, in application order.
    entries: Vec<(ContentId, Option<bool>, bool)>,
}

impl OptimisticPatch {
    fn apply(cache: &mut LockCache, updates: &[LockUpdate]) -> Self {
        let entries = updates
            .iter()
            .map(|u| {
                let prior = cache.locked_items.insert(u.content_id.clone(), u.is_locked);
                (u.content_id.clone(), prior, u.is_locked)
            })
            .collect();
        Self { entries }
    }

    /// Restore prior values, newest first. An entry is left alone if
    /// something else (e.g. a full fetch) has overwritten it since.
    fn rollback(self, cache: &mut LockCache) -> Vec<ContentId> {
        let mut reverted = Vec::new();
        for (id, prior, written) in self.entries.into_iter().rev() {
            if cache.locked_items.get(&id) != Some(&written) {
                continue;
            }
            match prior {
                Some(value) => {
                    cache.locked_items.insert(id.clone(), value);
                }
                None => {
                    cache.locked_items.remove(&id);
                }
            }
            reverted.push(id);
        }
        reverted
    }

    fn content_ids(&self) -> Vec<ContentId> {
        self.entries.iter().map(|(id, _, _)| id.clone()).collect()
    }
}

/// Process-wide lock cache with optimistic writes and durable snapshots.
pub struct LockStore {
    transport: Arc<dyn LockTransport>,
    storage: Arc<dyn KeyValueStorage>,
    state: RwLock<StoreState>,
    /// Sequence number of the last snapshot write that reached storage.
    written_seq: Mutex<u64>,
    event_tx: broadcast::Sender<LockEvent>,
}

impl LockStore {
    /// Create the store, restoring the persisted snapshot or falling back
    /// to the fail-safe defaults.
    pub fn new(transport: Arc<dyn LockTransport>, storage: Arc<dyn KeyValueStorage>) -> Self {
        let cache = load_cache(storage.as_ref());
        tracing::debug!(entries = cache.locked_items.len(), "Lock store initialised");
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            transport,
            storage,
            state: RwLock::new(StoreState {
                cache,
                in_flight: 0,
                issued_ticket: 0,
                applied_ticket: 0,
                epoch: 0,
                staged_seq: 0,
            }),
            written_seq: Mutex::new(0),
            event_tx,
        }
    }

    /// Subscribe to lock change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.event_tx.subscribe()
    }

    /// The transport, for read-only calls outside the cache (history).
    pub fn transport(&self) -> &Arc<dyn LockTransport> {
        &self.transport
    }

    // ---- reads ----

    /// A copy of the current cache.
    pub async fn snapshot(&self) -> LockCache {
        self.state.read().await.cache.clone()
    }

    /// Whether `id` is locked. Ids absent from the map are unlocked.
    pub async fn is_item_locked(&self, id: &str) -> bool {
        self.state.read().await.cache.is_item_locked(id)
    }

    pub async fn has_server_data(&self) -> bool {
        self.state.read().await.cache.has_server_data()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.cache.is_loading
    }

    pub async fn last_updated(&self) -> Option<Timestamp> {
        self.state.read().await.cache.last_updated
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.cache.error.clone()
    }

    /// Dismiss the current error message.
    pub async fn clear_error(&self) {
        self.state.write().await.cache.error = None;
    }

    // ---- writes ----

    /// Replace the lock map with the server's full state.
    ///
    /// Failures are recorded in the error slot and leave the map as it was.
    /// Safe to call while another fetch is in flight: whichever fetch
    /// started last wins, and older responses arriving late are dropped.
    pub async fn fetch_locks(&self) {
        let ticket = {
            let mut state = self.state.write().await;
            state.begin();
            state.cache.error = None;
            state.issued_ticket += 1;
            state.issued_ticket
        };

        let result = self.transport.fetch_all().await;

        let mut state = self.state.write().await;
        state.finish();

        if ticket <= state.applied_ticket {
            tracing::debug!(ticket, applied = state.applied_ticket, "Discarding stale lock fetch");
            return;
        }

        match result {
            Ok(listing) => {
                state.applied_ticket = ticket;
                state.cache.locked_items = listing
                    .locks
                    .into_iter()
                    .map(|record| (record.content_id, record.is_locked))
                    .collect();
                state.advance_last_updated(listing.last_updated);
                let staged = state.stage_save();

                let count = state.cache.locked_items.len();
                let last_updated = state.cache.last_updated;
                drop(state);
                self.flush(staged);

                tracing::debug!(count, "Content locks replaced from server");
                self.emit(LockEvent::Replaced {
                    count,
                    last_updated,
                });
            }
            Err(e) => {
                state.cache.error = Some(e.to_string());
                drop(state);

                tracing::warn!(error = %e, "Failed to fetch content locks");
                self.emit(LockEvent::Failed {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Optimistically set one item's lock, then reconcile with the server.
    ///
    /// On failure the optimistic entry is rolled back, the error is
    /// recorded, and the error is returned to the caller.
    pub async fn update_lock(
        &self,
        content_id: &str,
        locked: bool,
        reason: Option<&str>,
    ) -> ClientResult<LockRecord> {
        if let Err(e) = validate_content_id(content_id) {
            let err = ClientError::from(e);
            self.record_failure(&err).await;
            return Err(err);
        }

        let pending = self
            .apply_optimistic(&[LockUpdate::new(content_id, locked)])
            .await;

        let result = self.transport.update_one(content_id, locked, reason).await;

        let mut state = self.state.write().await;
        state.finish();
        if state.epoch != pending.epoch {
            tracing::debug!(content_id, "Store was reset during update, dropping result");
            return result;
        }
        match result {
            Ok(record) => {
                state
                    .cache
                    .locked_items
                    .insert(record.content_id.clone(), record.is_locked);
                state.advance_last_updated(record.updated_at);
                let staged = state.stage_save();
                drop(state);
                self.flush(staged);

                tracing::info!(content_id = %record.content_id, locked = record.is_locked, "Content lock updated");
                self.emit(LockEvent::Confirmed {
                    content_id: record.content_id.clone(),
                    locked: record.is_locked,
                });
                Ok(record)
            }
            Err(e) => {
                let reverted = pending.rollback(&mut state);
                state.cache.error = Some(e.to_string());
                let staged = state.stage_save();
                drop(state);
                self.flush(staged);

                tracing::warn!(content_id, error = %e, "Content lock update failed, rolled back");
                self.emit(LockEvent::Reverted {
                    content_ids: reverted,
                });
                self.emit(LockEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Optimistically apply several lock changes, send them as one batch,
    /// then re-fetch the full state whether or not the batch succeeded.
    ///
    /// If the batch fails and no full fetch started after the optimistic
    /// patch has been applied, the patched entries are rolled back locally.
    pub async fn batch_update_locks(
        &self,
        updates: &[LockUpdate],
        reason: Option<&str>,
    ) -> ClientResult<()> {
        let validation = if updates.is_empty() {
            Err(ClientError::Validation(
                "batch update needs at least one entry".to_string(),
            ))
        } else {
            updates
                .iter()
                .try_for_each(|u| validate_content_id(&u.content_id))
                .map_err(ClientError::from)
        };
        if let Err(err) = validation {
            self.record_failure(&err).await;
            return Err(err);
        }

        let pending = self.apply_optimistic(updates).await;

        let result = self.transport.batch_update(updates, reason).await;
        if let Err(e) = &result {
            tracing::warn!(count = updates.len(), error = %e, "Batch lock update failed, re-fetching");
        }

        self.fetch_locks().await;

        let mut state = self.state.write().await;
        state.finish();
        if state.epoch != pending.epoch {
            tracing::debug!("Store was reset during batch update, dropping result");
            return result;
        }
        match result {
            Ok(()) => {
                drop(state);
                tracing::info!(count = updates.len(), "Batch lock update applied");
                Ok(())
            }
            Err(e) => {
                let reverted = pending.rollback(&mut state);
                state.cache.error = Some(e.to_string());
                let staged = state.stage_save();
                drop(state);
                self.flush(staged);

                if !reverted.is_empty() {
                    self.emit(LockEvent::Reverted {
                        content_ids: reverted,
                    });
                }
                self.emit(LockEvent::Failed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Return to the fail-safe defaults and drop the persisted snapshot.
    ///
    /// Fetches already in flight are discarded when they land, so a
    /// previous user's state cannot reappear.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let in_flight = state.in_flight;
        state.cache = LockCache::fail_safe();
        state.cache.is_loading = in_flight > 0;
        state.applied_ticket = state.issued_ticket;
        state.epoch += 1;
        let staged = state.stage(SnapshotWrite::Remove);
        drop(state);
        self.flush(Some(staged));

        tracing::info!("Lock store reset to defaults");
        self.emit(LockEvent::Reset);
    }

    /// Spawn a task that resets the store each time a signed-in session
    /// ends, whether by explicit logout or a failed token refresh. The
    /// status current at the time of the call is the starting point. The
    /// task stops when `cancel` fires or the auth channel closes.
    pub fn spawn_reset_on_sign_out(
        self: &Arc<Self>,
        mut auth: watch::Receiver<AuthStatus>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let mut seen = *auth.borrow_and_update();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    changed = auth.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let current = *auth.borrow_and_update();
                        if current.ended(&seen) {
                            tracing::debug!(session = seen.session, "Session ended, resetting lock store");
                            store.reset().await;
                        }
                        seen = current;
                    }
                }
            }
        })
    }

    // ---- private helpers ----

    /// Mark an operation in flight, clear the error, and patch the map.
    async fn apply_optimistic(&self, updates: &[LockUpdate]) -> PendingWrite {
        let mut state = self.state.write().await;
        state.begin();
        state.cache.error = None;
        let patch = OptimisticPatch::apply(&mut state.cache, updates);
        let pending = PendingWrite {
            epoch: state.epoch,
            fetch_mark: state.issued_ticket,
            patch,
        };
        let staged = state.stage_save();
        drop(state);
        self.flush(staged);

        self.emit(LockEvent::Patched {
            content_ids: pending.patch.content_ids(),
        });
        pending
    }

    async fn record_failure(&self, err: &ClientError) {
        self.state.write().await.cache.error = Some(err.to_string());
        self.emit(LockEvent::Failed {
            message: err.to_string(),
        });
    }

    /// Write a staged snapshot unless a newer one has already been written.
    ///
    /// Storage writes are small and synchronous. They run outside the state
    /// lock, so readers are not held up by disk I/O.
    fn flush(&self, staged: Option<StagedWrite>) {
        let Some(staged) = staged else { return };
        let mut written = self.written_seq.lock().unwrap_or_else(PoisonError::into_inner);
        if staged.seq <= *written {
            tracing::trace!(seq = staged.seq, written = *written, "Skipping superseded lock snapshot");
            return;
        }
        let result = match &staged.write {
            SnapshotWrite::Save(raw) => self.storage.set(LOCK_STORAGE_KEY, raw),
            SnapshotWrite::Remove => self.storage.remove(LOCK_STORAGE_KEY),
        };
        *written = staged.seq;
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to persist lock snapshot");
        }
    }

    fn emit(&self, event: LockEvent) {
        // Ignore the SendError: it only means nobody is listening.
        let _ = self.event_tx.send(event);
    }
}
