//! Background lock synchronisation.
//!
//! While a user is signed in, [`SyncScheduler`] re-fetches the full lock
//! state:
//!
//! - once immediately when the session becomes authenticated,
//! - every `interval` thereafter,
//! - whenever the view regains focus ([`SchedulerHandle::notify_focus`]).
//!
//! Polling stops as soon as the session signs out and resumes on the next
//! sign-in. Polling is tied to one [`AuthStatus::session`]: a sign-out and
//! sign-in that both happen while a fetch is in flight still restart the
//! cycle with a fresh fetch. Each fetch is awaited inside the loop, so one
//! scheduler never overlaps its own requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthStatus;
use crate::store::LockStore;

/// Default time between background fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long [`SchedulerHandle::shutdown`] waits for the loop to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Periodic and focus-triggered lock refresh.
pub struct SyncScheduler {
    store: Arc<LockStore>,
    interval: Duration,
}

/// Control handle for a spawned [`SyncScheduler`].
pub struct SchedulerHandle {
    focus_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn new(store: Arc<LockStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Start the loop on the current runtime.
    ///
    /// `auth` reports the current session. Cancelling `cancel` (or calling
    /// [`SchedulerHandle::shutdown`]) stops the loop.
    pub fn spawn(self, auth: watch::Receiver<AuthStatus>, cancel: CancellationToken) -> SchedulerHandle {
        // Capacity 1: focus events that arrive while one is pending collapse.
        let (focus_tx, focus_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run(auth, focus_rx, cancel.clone()));
        SchedulerHandle {
            focus_tx,
            cancel,
            task,
        }
    }

    /// Drive the loop until `cancel` fires or the auth channel closes.
    pub async fn run(
        self,
        mut auth: watch::Receiver<AuthStatus>,
        mut focus: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        tracing::info!(interval_secs = self.interval.as_secs_f64(), "Lock sync scheduler started");

        loop {
            // Wait for a signed-in session. Focus events while signed out
            // are drained and ignored.
            let mut status = *auth.borrow_and_update();
            while !status.signed_in {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.stopped(),
                    changed = auth.changed() => {
                        if changed.is_err() {
                            return self.stopped();
                        }
                        status = *auth.borrow_and_update();
                    }
                    Some(()) = focus.recv() => {}
                }
            }

            let session = status.session;
            tracing::debug!(session, "Session authenticated, starting lock polling");
            self.store.fetch_locks().await;

            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return self.stopped(),
                    // A change that landed during a fetch is still pending
                    // here, however many sends it coalesced.
                    changed = auth.changed() => {
                        if changed.is_err() {
                            return self.stopped();
                        }
                        if auth.borrow_and_update().session != session {
                            tracing::debug!(session, "Session changed, restarting lock polling");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.store.fetch_locks().await;
                    }
                    Some(()) = focus.recv() => {
                        tracing::debug!("View focused, refreshing locks");
                        self.store.fetch_locks().await;
                    }
                }
            }
        }
    }

    fn stopped(&self) {
        tracing::info!("Lock sync scheduler stopped");
    }
}

impl SchedulerHandle {
    /// Request an immediate refresh because the view regained focus.
    pub fn notify_focus(&self) {
        // A full channel already has a refresh pending.
        let _ = self.focus_tx.try_send(());
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Lock sync task failed"),
            Err(_) => tracing::warn!("Lock sync task did not stop in time"),
        }
    }
}
