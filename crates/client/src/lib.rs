//! Content-lock client for the course portal.
//!
//! Talks to the remote lock service over HTTP, keeps a persisted
//! client-side cache of lock state with optimistic writes, and drives
//! periodic re-synchronisation while a user is signed in.
//!
//! - [`api::LockApi`]: authenticated REST transport with one-shot token
//!   refresh on `401`.
//! - [`auth::SessionAuth`]: persisted login session and token refresh.
//! - [`store::LockStore`]: the lock cache with optimistic update/rollback.
//! - [`scheduler::SyncScheduler`]: mount/focus/interval re-sync triggers.
//! - [`storage`] / [`snapshot`]: durable key-value storage and the
//!   versioned lock snapshot codec.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod response;
pub mod scheduler;
pub mod snapshot;
pub mod storage;
pub mod store;

pub use api::{LockApi, LockListing, LockTransport};
pub use auth::{AuthProvider, AuthStatus, SessionAuth};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use events::LockEvent;
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::LockStore;
