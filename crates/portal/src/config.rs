use std::path::PathBuf;
use std::time::Duration;

use courseport_client::config::{ClientConfig, DEFAULT_REQUEST_TIMEOUT};
use courseport_client::scheduler::DEFAULT_POLL_INTERVAL;

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";
const DEFAULT_STORAGE_DIR: &str = ".courseport";

/// Portal configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    /// Lock and auth service base URL, including the version prefix.
    pub api_base_url: String,
    /// Directory holding the persisted session and lock snapshot.
    pub storage_dir: PathBuf,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PortalConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                        |
    /// |---------------------------|--------------------------------|
    /// | `API_BASE_URL`            | `http://localhost:8000/api/v1` |
    /// | `STORAGE_DIR`             | `.courseport`                  |
    /// | `LOCK_POLL_INTERVAL_SECS` | `5`                            |
    /// | `REQUEST_TIMEOUT_SECS`    | `20`                           |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable or zero
    /// durations fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("API_BASE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.api_base_url);

        let storage_dir = lookup("STORAGE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);

        let poll_interval =
            secs_var(&lookup, "LOCK_POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval);
        let request_timeout =
            secs_var(&lookup, "REQUEST_TIMEOUT_SECS").unwrap_or(defaults.request_timeout);

        Self {
            api_base_url,
            storage_dir,
            poll_interval,
            request_timeout,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.api_base_url).with_timeout(self.request_timeout)
    }
}

fn secs_var<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid duration, using default");
            None
        }
    }
}
