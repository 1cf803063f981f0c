//! Response envelope shared by the lock and auth services.
//!
//! Every endpoint answers with
//! `{ "success": bool, "data": T?, "message": str, "timestamp": str }`.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use courseport_core::types::{lenient_timestamp, Timestamp};

use crate::error::{ClientError, ClientResult};

/// Standard `{ success, data, message, timestamp }` envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<Timestamp>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the `data` field, failing if the service omitted it.
    pub fn into_data(self) -> ClientResult<T> {
        self.data
            .ok_or_else(|| ClientError::Decode("response envelope has no data".to_string()))
    }
}

/// Error message for a failed response: the body's `message` field when
/// present, otherwise a generic status line.
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP error! status: {status}"))
}

/// Read a response into an envelope.
///
/// Non-2xx statuses become [`ClientError::Server`]; a 2xx body with
/// `success: false` does too, carrying the envelope's message.
pub async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> ClientResult<ApiEnvelope<T>> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ClientError::Server {
            status: status.as_u16(),
            message: error_message(status.as_u16(), &body),
        });
    }

    let envelope: ApiEnvelope<T> =
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))?;

    if !envelope.success {
        let message = if envelope.message.is_empty() {
            "request was not successful".to_string()
        } else {
            envelope.message
        };
        return Err(ClientError::Server {
            status: status.as_u16(),
            message,
        });
    }

    Ok(envelope)
}
