use courseport_core::error::CoreError;
use courseport_core::types::ContentId;

/// Errors surfaced by the lock client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (connect, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// A `401` survived the single refresh-and-retry, or refresh failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The service answered with a non-2xx status or `success: false`.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The service does not know the content item.
    #[error("Content '{0}' not found")]
    NotFound(ContentId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A 2xx response body did not match the expected shape.
    #[error("Invalid response: {0}")]
    Decode(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ClientError::Validation(msg),
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}
