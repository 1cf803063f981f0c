use std::time::Duration;

/// Default transport timeout; keeps a hung request from pinning
/// `is_loading` indefinitely.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Connection settings for the lock and auth services.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL including the version prefix, e.g.
    /// `https://host/api/v1`. A trailing `/` is ignored.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Build a pooled HTTP client honouring the configured timeout.
    pub fn build_http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
    }
}
