//! Push gateway configuration.

use url::Url;

/// Where and how to deliver push notifications.
///
/// Custom `Debug` implementation redacts the `server_key` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct PushConfig {
    /// Send endpoint of the push gateway.
    pub endpoint: Url,
    /// Bearer credential presented to the gateway.
    pub server_key: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConfig")
            .field("endpoint", &self.endpoint)
            .field("server_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl PushConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when `FIXIN_PUSH_URL` is unset, meaning push is
    /// disabled.
    ///
    /// Variables:
    /// - `FIXIN_PUSH_URL` (optional; enables push)
    /// - `FIXIN_PUSH_KEY` (required when `FIXIN_PUSH_URL` is set)
    /// - `FIXIN_PUSH_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(raw_url) = std::env::var("FIXIN_PUSH_URL") else {
            return Ok(None);
        };
        let endpoint = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl("FIXIN_PUSH_URL".to_string(), e.to_string()))?;
        let server_key = std::env::var("FIXIN_PUSH_KEY").map_err(|_| ConfigError::MissingKey)?;

        Ok(Some(Self {
            endpoint,
            server_key,
            timeout_secs: std::env::var("FIXIN_PUSH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FIXIN_PUSH_KEY environment variable is required when FIXIN_PUSH_URL is set")]
    MissingKey,
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
