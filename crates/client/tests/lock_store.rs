//! Integration tests for the lock store against an in-memory lock service.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;

use common::{lock_map, wait_for_event, FakeTransport};
use courseport_client::api::LockTransport;
use courseport_client::error::ClientError;
use courseport_client::events::LockEvent;
use courseport_client::storage::{FileStorage, KeyValueStorage, MemoryStorage, LOCK_STORAGE_KEY};
use courseport_client::store::LockStore;
use courseport_core::locks::{LockCache, LockUpdate};

fn store_with(transport: &Arc<FakeTransport>, storage: Arc<dyn KeyValueStorage>) -> Arc<LockStore> {
    Arc::new(LockStore::new(
        Arc::clone(transport) as Arc<dyn LockTransport>,
        storage,
    ))
}

fn memory_store(transport: &Arc<FakeTransport>) -> (Arc<LockStore>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let store = store_with(transport, Arc::clone(&storage) as Arc<dyn KeyValueStorage>);
    (store, storage)
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached");
}

// ---------------------------------------------------------------------------
// Test: fresh store starts from the fail-safe defaults
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_store_uses_fail_safe_defaults() {
    let transport = FakeTransport::with_server(&[]);
    let (store, _) = memory_store(&transport);

    assert!(store.is_item_locked("day2").await);
    assert!(store.is_item_locked("day3").await);
    assert!(!store.is_item_locked("day1").await);
    assert!(store.has_server_data().await);
    assert!(store.last_updated().await.is_none());
    assert!(!store.is_loading().await);
    assert!(store.error().await.is_none());
}

// ---------------------------------------------------------------------------
// Test: a successful fetch replaces the map wholesale
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_replaces_map_wholesale() {
    let transport = FakeTransport::with_server(&[("day1", false), ("day2", false)]);
    let (store, storage) = memory_store(&transport);

    store.fetch_locks().await;

    let cache = store.snapshot().await;
    assert_eq!(cache.locked_items, lock_map(&[("day1", false), ("day2", false)]));
    // day3 was only locked by the fail-safe default and is gone now.
    assert!(!cache.is_item_locked("day3"));
    assert!(cache.last_updated.is_some());
    assert!(!cache.is_loading);
    assert!(storage.contains(LOCK_STORAGE_KEY));
}

// ---------------------------------------------------------------------------
// Test: a failed fetch keeps the map and records the error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_fetch_keeps_previous_map() {
    let transport = FakeTransport::with_server(&[("day1", true)]);
    let (store, _) = memory_store(&transport);
    store.fetch_locks().await;

    transport.fail_fetch.store(true, Ordering::SeqCst);
    transport.set_server(&[("day1", false)]);
    store.fetch_locks().await;

    assert!(store.is_item_locked("day1").await);
    assert!(!store.is_loading().await);
    let error = store.error().await.expect("error recorded");
    assert!(error.contains("500"));

    store.clear_error().await;
    assert!(store.error().await.is_none());
}

// ---------------------------------------------------------------------------
// Test: a single update is visible before the server confirms it
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_is_applied_optimistically() {
    let transport = FakeTransport::with_server(&[("day1", false)]);
    let (store, _) = memory_store(&transport);
    let mut events = store.subscribe();
    let gate = transport.hold_updates();

    let task = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.update_lock("day1", true, Some("Exam week")).await })
    };

    wait_for_event(&mut events, |e| matches!(e, LockEvent::Patched { .. })).await;
    assert!(store.is_item_locked("day1").await);
    assert!(store.is_loading().await);

    gate.notify_one();
    let record = task.await.unwrap().unwrap();
    assert_eq!(record.content_id, "day1");
    assert!(record.is_locked);

    let confirmed = wait_for_event(&mut events, |e| matches!(e, LockEvent::Confirmed { .. })).await;
    assert_eq!(
        confirmed,
        LockEvent::Confirmed {
            content_id: "day1".into(),
            locked: true
        }
    );
    assert!(store.is_item_locked("day1").await);
    assert!(!store.is_loading().await);
    assert!(store.last_updated().await.is_some());
}

// ---------------------------------------------------------------------------
// Test: a failed update restores the exact prior entry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_update_rolls_back_exact_prior_state() {
    let transport = FakeTransport::with_server(&[]);
    transport.fail_update.store(true, Ordering::SeqCst);
    let (store, _) = memory_store(&transport);

    // day1 is absent from the fail-safe map.
    let err = store.update_lock("day1", true, None).await.unwrap_err();
    assert_matches!(err, ClientError::Server { status: 500, .. });
    assert!(!store.snapshot().await.locked_items.contains_key("day1"));

    let err = store.update_lock("day2", false, None).await.unwrap_err();
    assert_matches!(err, ClientError::Server { .. });
    assert!(store.is_item_locked("day2").await);

    assert_eq!(
        store.error().await.as_deref(),
        Some("Server error (500): Internal server error")
    );
    assert!(!store.is_loading().await);
}

// ---------------------------------------------------------------------------
// Test: invalid ids never reach the transport
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_content_id_is_rejected() {
    let transport = FakeTransport::with_server(&[]);
    let (store, _) = memory_store(&transport);

    let err = store.update_lock("  ", true, None).await.unwrap_err();
    assert_matches!(err, ClientError::Validation(_));
    assert_eq!(transport.updates.load(Ordering::SeqCst), 0);
    assert!(store.error().await.is_some());
}

// ---------------------------------------------------------------------------
// Test: confirmation never moves last_updated backwards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn confirmation_keeps_newer_last_updated() {
    let transport = FakeTransport::with_server(&[("day1", false)]);
    let future = Utc::now() + chrono::Duration::days(1);
    *transport.server_time.lock().unwrap() = Some(future);
    let (store, _) = memory_store(&transport);

    store.fetch_locks().await;
    store.update_lock("day1", true, None).await.unwrap();

    assert_eq!(store.last_updated().await, Some(future));
}

// ---------------------------------------------------------------------------
// Test: a successful batch re-fetches the full state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_success_refetches() {
    let transport = FakeTransport::with_server(&[("day1", false), ("day2", true), ("day3", true)]);
    let (store, _) = memory_store(&transport);

    let updates = [LockUpdate::new("day2", false), LockUpdate::new("day3", false)];
    store
        .batch_update_locks(&updates, Some("Unlocked by administrator"))
        .await
        .unwrap();

    assert_eq!(transport.batches.load(Ordering::SeqCst), 1);
    assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(store.snapshot().await.locked_items, transport.server_state());
    assert!(!store.is_item_locked("day3").await);
    assert!(store.error().await.is_none());
    assert!(!store.is_loading().await);
}

// ---------------------------------------------------------------------------
// Test: a partially applied batch converges to the server's state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_batch_failure_converges_to_server_state() {
    let transport = FakeTransport::with_server(&[("day1", false), ("day2", true), ("day3", true)]);
    transport.fail_batch.store(true, Ordering::SeqCst);
    transport.partial_batch.store(true, Ordering::SeqCst);
    let (store, _) = memory_store(&transport);

    let updates = [LockUpdate::new("day2", false), LockUpdate::new("day3", false)];
    let err = store.batch_update_locks(&updates, None).await.unwrap_err();
    assert_matches!(err, ClientError::Server { .. });

    // Only day2 was applied server-side; the re-fetch shows exactly that.
    assert_eq!(
        store.snapshot().await.locked_items,
        lock_map(&[("day1", false), ("day2", false), ("day3", true)])
    );
    assert!(store.error().await.is_some());
    assert!(!store.is_loading().await);
}

// ---------------------------------------------------------------------------
// Test: a failed batch keeps the state of a fetch that landed first
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_batch_keeps_newer_fetch_result() {
    let transport = FakeTransport::with_server(&[("day2", true), ("day3", true)]);
    transport.fail_batch.store(true, Ordering::SeqCst);
    transport.partial_batch.store(true, Ordering::SeqCst);
    // The batch's own re-fetch is held and eventually fails.
    let gate = transport.script_fetch(None);
    let (store, storage) = memory_store(&transport);

    let batch = tokio::spawn({
        let store = Arc::clone(&store);
        async move {
            let updates = [LockUpdate::new("day2", false), LockUpdate::new("day3", false)];
            store.batch_update_locks(&updates, None).await
        }
    });
    wait_until(|| transport.fetches.load(Ordering::SeqCst) == 1).await;

    // A poll started after the batch sees day2 unlocked server-side.
    store.fetch_locks().await;
    assert_eq!(store.snapshot().await.locked_items, transport.server_state());

    gate.notify_one();
    let err = batch.await.unwrap().unwrap_err();
    assert_matches!(err, ClientError::Server { .. });

    let expected = lock_map(&[("day2", false), ("day3", true)]);
    assert_eq!(transport.server_state(), expected);
    assert_eq!(store.snapshot().await.locked_items, expected);
    assert!(store.error().await.is_some());

    let restarted = store_with(&transport, storage as Arc<dyn KeyValueStorage>);
    assert_eq!(restarted.snapshot().await.locked_items, expected);
}

// ---------------------------------------------------------------------------
// Test: batch and re-fetch both failing rolls back locally
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_failure_without_refetch_rolls_back() {
    let transport = FakeTransport::with_server(&[]);
    transport.fail_batch.store(true, Ordering::SeqCst);
    transport.fail_fetch.store(true, Ordering::SeqCst);
    let (store, _) = memory_store(&transport);

    let updates = [LockUpdate::new("day2", false), LockUpdate::new("day1", true)];
    store.batch_update_locks(&updates, None).await.unwrap_err();

    assert_eq!(store.snapshot().await.locked_items, LockCache::fail_safe().locked_items);
    assert!(store.error().await.is_some());
}

// ---------------------------------------------------------------------------
// Test: empty batch is a validation error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_batch_is_rejected() {
    let transport = FakeTransport::with_server(&[]);
    let (store, _) = memory_store(&transport);

    let err = store.batch_update_locks(&[], None).await.unwrap_err();
    assert_matches!(err, ClientError::Validation(_));
    assert_eq!(transport.batches.load(Ordering::SeqCst), 0);
    assert_eq!(transport.fetches.load(Ordering::SeqCst), 0);
    assert!(store.error().await.is_some());
}

// ---------------------------------------------------------------------------
// Test: overlapping fetches, the last one started wins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn last_started_fetch_wins() {
    let transport = FakeTransport::with_server(&[]);
    let first_gate = transport.script_fetch(Some(&[("day1", true)]));
    let second_gate = transport.script_fetch(Some(&[("day1", false)]));
    let (store, _) = memory_store(&transport);

    let first = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_locks().await }
    });
    wait_until(|| transport.fetches.load(Ordering::SeqCst) == 1).await;

    let second = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_locks().await }
    });
    wait_until(|| transport.fetches.load(Ordering::SeqCst) == 2).await;

    second_gate.notify_one();
    second.await.unwrap();
    first_gate.notify_one();
    first.await.unwrap();

    assert_eq!(store.snapshot().await.locked_items, lock_map(&[("day1", false)]));
    assert!(!store.is_loading().await);
}

// ---------------------------------------------------------------------------
// Test: reset restores defaults and discards in-flight fetches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reset_discards_in_flight_fetch() {
    let transport = FakeTransport::with_server(&[("day2", false), ("day3", false)]);
    let (store, storage) = memory_store(&transport);
    store.fetch_locks().await;
    assert!(!store.is_item_locked("day2").await);

    let gate = transport.script_fetch(Some(&[("day2", false), ("day3", false)]));
    let pending = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.fetch_locks().await }
    });
    wait_until(|| transport.fetches.load(Ordering::SeqCst) == 2).await;

    store.reset().await;
    assert!(!storage.contains(LOCK_STORAGE_KEY));

    gate.notify_one();
    pending.await.unwrap();

    let cache = store.snapshot().await;
    assert_eq!(cache.locked_items, LockCache::fail_safe().locked_items);
    assert!(cache.last_updated.is_none());
    assert!(!cache.is_loading);
}

// ---------------------------------------------------------------------------
// Test: lock state survives a restart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persisted_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::with_server(&[("day1", false), ("day2", false), ("day3", true)]);

    let first = store_with(&transport, Arc::new(FileStorage::new(dir.path())));
    first.fetch_locks().await;
    let before = first.snapshot().await;
    drop(first);

    let second = store_with(&transport, Arc::new(FileStorage::new(dir.path())));
    let after = second.snapshot().await;

    assert_eq!(after.locked_items, before.locked_items);
    assert_eq!(after.last_updated, before.last_updated);
    assert!(!after.is_loading);
    assert!(after.error.is_none());
    assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Test: repeated fetches are idempotent and never regress last_updated
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_fetches_are_idempotent() {
    let transport = FakeTransport::with_server(&[("day1", false), ("day2", true)]);
    let (store, _) = memory_store(&transport);

    store.fetch_locks().await;
    let first = store.snapshot().await;
    store.fetch_locks().await;
    let second = store.snapshot().await;
    assert_eq!(first.locked_items, second.locked_items);
    assert_eq!(first.last_updated, second.last_updated);

    let earlier = first.last_updated.unwrap() - chrono::Duration::hours(1);
    *transport.server_time.lock().unwrap() = Some(earlier);
    store.fetch_locks().await;
    assert_eq!(store.last_updated().await, first.last_updated);
}
