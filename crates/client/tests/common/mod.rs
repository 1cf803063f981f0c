//! Shared fakes for the lock client integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, Notify};

use courseport_client::api::{LockListing, LockTransport};
use courseport_client::auth::AuthProvider;
use courseport_client::error::{ClientError, ClientResult};
use courseport_client::events::LockEvent;
use courseport_core::locks::{HistoryEntry, LockMap, LockRecord, LockUpdate};
use courseport_core::types::Timestamp;

pub fn server_error() -> ClientError {
    ClientError::Server {
        status: 500,
        message: "Internal server error".to_string(),
    }
}

pub fn lock_map(entries: &[(&str, bool)]) -> LockMap {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn record(content_id: &str, is_locked: bool, updated_at: Option<Timestamp>) -> LockRecord {
    LockRecord {
        id: None,
        content_id: content_id.to_string(),
        is_locked,
        reason: None,
        locked_at: None,
        unlocked_at: None,
        created_by: None,
        updated_by: None,
        created_at: None,
        updated_at,
    }
}

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

/// A fetch whose response is held until `gate` is notified, then answers
/// with `locks` (or fails when `locks` is `None`).
pub struct ScriptedFetch {
    pub gate: Arc<Notify>,
    pub locks: Option<LockMap>,
}

/// In-memory lock service.
#[derive(Default)]
pub struct FakeTransport {
    pub server: Mutex<LockMap>,
    pub server_time: Mutex<Option<Timestamp>>,
    pub fetches: AtomicUsize,
    pub updates: AtomicUsize,
    pub batches: AtomicUsize,
    pub fail_fetch: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_batch: AtomicBool,
    /// When set, a failing batch still applies its first entry.
    pub partial_batch: AtomicBool,
    /// When set, `update_one` waits for a notification before answering.
    pub update_gate: Mutex<Option<Arc<Notify>>>,
    pub scripted_fetches: Mutex<VecDeque<ScriptedFetch>>,
}

impl FakeTransport {
    pub fn with_server(entries: &[(&str, bool)]) -> Arc<Self> {
        let transport = Self::default();
        *transport.server.lock().unwrap() = lock_map(entries);
        *transport.server_time.lock().unwrap() = Some(Utc::now());
        Arc::new(transport)
    }

    pub fn set_server(&self, entries: &[(&str, bool)]) {
        *self.server.lock().unwrap() = lock_map(entries);
    }

    pub fn server_state(&self) -> LockMap {
        self.server.lock().unwrap().clone()
    }

    /// Hold every subsequent `update_one` until the returned gate opens.
    pub fn hold_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.update_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Queue a held fetch; returns the gate that releases it.
    pub fn script_fetch(&self, locks: Option<&[(&str, bool)]>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.scripted_fetches.lock().unwrap().push_back(ScriptedFetch {
            gate: Arc::clone(&gate),
            locks: locks.map(lock_map),
        });
        gate
    }

    fn listing(&self, locks: LockMap) -> LockListing {
        LockListing {
            locks: locks
                .into_iter()
                .map(|(id, locked)| record(&id, locked, None))
                .collect(),
            last_updated: *self.server_time.lock().unwrap(),
        }
    }
}

#[async_trait]
impl LockTransport for FakeTransport {
    async fn fetch_all(&self) -> ClientResult<LockListing> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let scripted = self.scripted_fetches.lock().unwrap().pop_front();
        if let Some(script) = scripted {
            script.gate.notified().await;
            return match script.locks {
                Some(locks) => Ok(self.listing(locks)),
                None => Err(server_error()),
            };
        }

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        Ok(self.listing(self.server_state()))
    }

    async fn update_one(
        &self,
        content_id: &str,
        locked: bool,
        _reason: Option<&str>,
    ) -> ClientResult<LockRecord> {
        self.updates.fetch_add(1, Ordering::SeqCst);

        let gate = self.update_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_update.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        self.server
            .lock()
            .unwrap()
            .insert(content_id.to_string(), locked);
        Ok(record(content_id, locked, Some(Utc::now())))
    }

    async fn batch_update(&self, updates: &[LockUpdate], _reason: Option<&str>) -> ClientResult<()> {
        self.batches.fetch_add(1, Ordering::SeqCst);

        if self.fail_batch.load(Ordering::SeqCst) {
            if self.partial_batch.load(Ordering::SeqCst) {
                if let Some(first) = updates.first() {
                    self.server
                        .lock()
                        .unwrap()
                        .insert(first.content_id.clone(), first.is_locked);
                }
            }
            return Err(server_error());
        }

        let mut server = self.server.lock().unwrap();
        for update in updates {
            server.insert(update.content_id.clone(), update.is_locked);
        }
        Ok(())
    }

    async fn fetch_history(&self, content_id: &str) -> ClientResult<Vec<HistoryEntry>> {
        Err(ClientError::NotFound(content_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Wait for the next event matching `pred`, skipping others.
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<LockEvent>, pred: F) -> LockEvent
where
    F: Fn(&LockEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for lock event")
            .expect("lock event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

// ---------------------------------------------------------------------------
// TestAuth
// ---------------------------------------------------------------------------

/// Token provider whose refresh hands out a fixed replacement token.
pub struct TestAuth {
    pub token: Mutex<Option<String>>,
    pub refreshed_token: String,
    pub refresh_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
}

impl TestAuth {
    pub fn new(token: &str, refreshed_token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: Mutex::new(Some(token.to_string())),
            refreshed_token: refreshed_token.to_string(),
            refresh_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl AuthProvider for TestAuth {
    fn access_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    async fn refresh(&self) -> ClientResult<String> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::Auth("refresh token expired".to_string()));
        }
        *self.token.lock().unwrap() = Some(self.refreshed_token.clone());
        Ok(self.refreshed_token.clone())
    }
}
