//! Authentication collaborator.
//!
//! [`AuthProvider`] is the seam the lock transport uses to read the
//! current bearer token and to request a refresh after a `401`.
//! [`SessionAuth`] is the concrete provider: it logs in against the
//! portal's auth service, persists the session under
//! [`AUTH_STORAGE_KEY`], and broadcasts [`AuthStatus`] over a [`watch`]
//! channel for background tasks.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use courseport_core::roles;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::response::read_envelope;
use crate::storage::{KeyValueStorage, AUTH_STORAGE_KEY, LOCK_STORAGE_KEY};

/// Source of bearer tokens for authenticated requests.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current access token, read fresh on every call.
    fn access_token(&self) -> Option<String>;

    fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Obtain a new access token. Called at most once per request.
    async fn refresh(&self) -> ClientResult<String>;
}

/// Authentication status broadcast by [`SessionAuth::subscribe`].
///
/// `session` increases on every sign-in and sign-out, so a sign-out quickly
/// followed by a sign-in is still visible after the watch channel coalesces
/// the two sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthStatus {
    pub session: u64,
    pub signed_in: bool,
}

impl AuthStatus {
    pub fn signed_in(session: u64) -> Self {
        Self {
            session,
            signed_in: true,
        }
    }

    pub fn signed_out(session: u64) -> Self {
        Self {
            session,
            signed_in: false,
        }
    }

    /// Whether a signed-in session observed as `earlier` has ended by the
    /// time `self` was observed.
    pub fn ended(&self, earlier: &AuthStatus) -> bool {
        earlier.signed_in && self.session != earlier.session
    }

    fn next(self, signed_in: bool) -> Self {
        Self {
            session: self.session + 1,
            signed_in,
        }
    }
}

// ---------------------------------------------------------------------------
// Session model
// ---------------------------------------------------------------------------

/// The signed-in user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        roles::is_admin(&self.role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Persisted login session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: UserProfile,
    pub tokens: AuthTokens,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    user: UserProfile,
    tokens: AuthTokens,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshData {
    access_token: String,
    expires_in: i64,
}

// ---------------------------------------------------------------------------
// SessionAuth
// ---------------------------------------------------------------------------

/// Login session backed by the portal's `/auth` endpoints.
pub struct SessionAuth {
    client: reqwest::Client,
    base_url: String,
    storage: Arc<dyn KeyValueStorage>,
    session: RwLock<Option<Session>>,
    status_tx: watch::Sender<AuthStatus>,
}

impl SessionAuth {
    /// Create the provider, restoring a persisted session if one exists.
    pub fn new(config: &ClientConfig, storage: Arc<dyn KeyValueStorage>) -> ClientResult<Self> {
        let client = config.build_http_client()?;
        Ok(Self::with_client(client, config.base_url().to_string(), storage))
    }

    /// Create the provider reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: String,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Self {
        let session = restore_session(storage.as_ref());
        let initial = if session.is_some() {
            AuthStatus::signed_in(0)
        } else {
            AuthStatus::signed_out(0)
        };
        let (status_tx, _) = watch::channel(initial);
        if let Some(s) = &session {
            tracing::info!(user_id = %s.user.id, "Restored persisted session");
        }

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage,
            session: RwLock::new(session),
            status_tx,
        }
    }

    /// Subscribe to authentication status transitions.
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status_tx.subscribe()
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<UserProfile> {
        self.read_session().as_ref().map(|s| s.user.clone())
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.is_admin())
    }

    /// Sign in with email and password.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<UserProfile> {
        if !email.contains('@') || password.is_empty() {
            return Err(ClientError::Validation(
                "email and password are required".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let data: LoginData = read_envelope(response).await?.into_data()?;

        let session = Session {
            user: data.user.clone(),
            tokens: data.tokens,
        };
        self.store_session(Some(session));
        self.status_tx.send_modify(|status| *status = status.next(true));

        tracing::info!(user_id = %data.user.id, role = %data.user.role, "Signed in");
        Ok(data.user)
    }

    /// Sign out, forgetting the session and the cached lock snapshot so the
    /// next user on this device starts from the fail-safe defaults.
    pub fn logout(&self) {
        self.store_session(None);
        if let Err(e) = self.storage.remove(LOCK_STORAGE_KEY) {
            tracing::warn!(error = %e, "Failed to clear lock snapshot on logout");
        }
        self.status_tx.send_modify(|status| *status = status.next(false));
        tracing::info!("Signed out");
    }

    // ---- private helpers ----

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_session(&self, session: Option<Session>) {
        let persisted = match &session {
            Some(s) => serde_json::to_string(s)
                .map_err(|e| ClientError::Storage(e.to_string()))
                .and_then(|raw| self.storage.set(AUTH_STORAGE_KEY, &raw)),
            None => self.storage.remove(AUTH_STORAGE_KEY),
        };
        if let Err(e) = persisted {
            tracing::error!(error = %e, "Failed to persist session");
        }

        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    async fn request_refresh(&self, refresh_token: &str) -> ClientResult<RefreshData> {
        let response = self
            .client
            .post(format!("{}/auth/refresh", self.base_url))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        read_envelope(response).await?.into_data()
    }
}

#[async_trait]
impl AuthProvider for SessionAuth {
    fn access_token(&self) -> Option<String> {
        self.read_session()
            .as_ref()
            .map(|s| s.tokens.access_token.clone())
    }

    /// A failed refresh signs the user out.
    async fn refresh(&self) -> ClientResult<String> {
        let refresh_token = self
            .read_session()
            .as_ref()
            .map(|s| s.tokens.refresh_token.clone())
            .ok_or_else(|| ClientError::Auth("not signed in".to_string()))?;

        match self.request_refresh(&refresh_token).await {
            Ok(data) => {
                let mut session = self.read_session().clone().ok_or_else(|| {
                    ClientError::Auth("signed out during token refresh".to_string())
                })?;
                session.tokens.access_token = data.access_token.clone();
                session.tokens.expires_in = data.expires_in;
                self.store_session(Some(session));
                tracing::debug!("Access token refreshed");
                Ok(data.access_token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, signing out");
                self.logout();
                Err(ClientError::Auth(format!("token refresh failed: {e}")))
            }
        }
    }
}

fn restore_session(storage: &dyn KeyValueStorage) -> Option<Session> {
    let raw = match storage.get(AUTH_STORAGE_KEY) {
        Ok(raw) => raw?,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read persisted session");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(error = %e, "Persisted session is malformed, ignoring");
            None
        }
    }
}
