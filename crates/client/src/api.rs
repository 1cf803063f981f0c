//! REST transport for the content-lock service.
//!
//! Wraps the four lock endpoints using [`reqwest`]. Every request carries
//! the bearer token read from the [`AuthProvider`] at call time; a `401`
//! triggers exactly one refresh and one retry before surfacing
//! [`ClientError::Auth`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use courseport_core::locks::{HistoryEntry, LockRecord, LockUpdate};
use courseport_core::types::{lenient_timestamp, validate_content_id, Timestamp};

use crate::auth::AuthProvider;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::response::read_envelope;

/// Full lock state as of `last_updated`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LockListing {
    pub locks: Vec<LockRecord>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_updated: Option<Timestamp>,
}

/// The four logical operations of the lock service.
#[async_trait]
pub trait LockTransport: Send + Sync {
    /// `GET /content/locks/`
    async fn fetch_all(&self) -> ClientResult<LockListing>;

    /// `PUT /content/locks/{content_id}`. The returned record is the
    /// server's authoritative state.
    async fn update_one(
        &self,
        content_id: &str,
        locked: bool,
        reason: Option<&str>,
    ) -> ClientResult<LockRecord>;

    /// `PUT /content/locks/batch/`. Partial application is possible on
    /// failure; callers must re-fetch to learn the true state.
    async fn batch_update(&self, updates: &[LockUpdate], reason: Option<&str>) -> ClientResult<()>;

    /// `GET /content/locks/{content_id}/history`
    async fn fetch_history(&self, content_id: &str) -> ClientResult<Vec<HistoryEntry>>;
}

#[derive(Debug, Serialize)]
struct UpdateLockBody<'a> {
    is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct BatchUpdateBody<'a> {
    updates: &'a [LockUpdate],
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// HTTP client for the lock service.
pub struct LockApi {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl LockApi {
    /// Create a transport with its own pooled client and the configured
    /// request timeout.
    pub fn new(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> ClientResult<Self> {
        let client = config.build_http_client()?;
        Ok(Self::with_client(client, config.base_url().to_string(), auth))
    }

    /// Create a transport reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_token(request: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request with the current token, refreshing and retrying once
    /// on `401`.
    async fn send_authorized<F>(&self, build: F) -> ClientResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.auth.access_token();
        let response = Self::with_token(build(&self.client), token.as_deref())
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!("Lock service rejected access token, refreshing once");
        let fresh = self.auth.refresh().await.map_err(|e| match e {
            ClientError::Auth(msg) => ClientError::Auth(msg),
            other => ClientError::Auth(format!("token refresh failed: {other}")),
        })?;

        let retry = Self::with_token(build(&self.client), Some(&fresh))
            .send()
            .await?;

        if retry.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("Lock service rejected refreshed access token");
            return Err(ClientError::Auth(
                "access token rejected after refresh".to_string(),
            ));
        }
        Ok(retry)
    }
}

#[async_trait]
impl LockTransport for LockApi {
    async fn fetch_all(&self) -> ClientResult<LockListing> {
        let url = self.url("/content/locks/");
        tracing::debug!(%url, "Fetching content locks");

        let response = self.send_authorized(|c| c.get(&url)).await?;
        let envelope = read_envelope::<LockListing>(response).await?;
        let served_at = envelope.timestamp;
        let mut listing = envelope.into_data()?;
        if listing.last_updated.is_none() {
            listing.last_updated = served_at;
        }
        Ok(listing)
    }

    async fn update_one(
        &self,
        content_id: &str,
        locked: bool,
        reason: Option<&str>,
    ) -> ClientResult<LockRecord> {
        validate_content_id(content_id)?;
        let url = self.url(&format!("/content/locks/{content_id}"));
        let body = UpdateLockBody {
            is_locked: locked,
            reason,
        };
        tracing::debug!(content_id, locked, "Updating content lock");

        let response = self.send_authorized(|c| c.put(&url).json(&body)).await?;
        match read_envelope::<LockRecord>(response).await {
            Ok(envelope) => envelope.into_data(),
            Err(ClientError::Server { status: 404, .. }) => {
                Err(ClientError::NotFound(content_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn batch_update(&self, updates: &[LockUpdate], reason: Option<&str>) -> ClientResult<()> {
        if updates.is_empty() {
            return Err(ClientError::Validation(
                "batch update needs at least one entry".to_string(),
            ));
        }
        for update in updates {
            validate_content_id(&update.content_id)?;
        }

        let url = self.url("/content/locks/batch/");
        let body = BatchUpdateBody { updates, reason };
        tracing::debug!(count = updates.len(), "Batch updating content locks");

        let response = self.send_authorized(|c| c.put(&url).json(&body)).await?;
        read_envelope::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn fetch_history(&self, content_id: &str) -> ClientResult<Vec<HistoryEntry>> {
        validate_content_id(content_id)?;
        let url = self.url(&format!("/content/locks/{content_id}/history"));

        let response = self.send_authorized(|c| c.get(&url)).await?;
        match read_envelope::<Vec<HistoryEntry>>(response).await {
            Ok(envelope) => Ok(envelope.data.unwrap_or_default()),
            Err(ClientError::Server { status: 404, .. }) => {
                Err(ClientError::NotFound(content_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}
