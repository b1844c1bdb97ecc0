//! # Application State
//!
//! Shared state handed to every route handler via Axum's `State` extractor.

use std::sync::Arc;

use fixin_dispatch::{BroadcastHub, DispatchEngine};

/// Process-level configuration for the HTTP service.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared bearer secret. `None` is development mode.
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<DispatchEngine>,
    /// In-process fanout hub the engine publishes to.
    pub hub: BroadcastHub,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(engine: Arc<DispatchEngine>, hub: BroadcastHub, config: AppConfig) -> Self {
        Self {
            engine,
            hub,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_token() {
        let config = AppConfig {
            port: 9000,
            auth_token: Some("top-secret".into()),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("9000"));
        assert!(!debug.contains("top-secret"));
    }

    #[test]
    fn default_is_development_mode() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.auth_token.is_none());
    }
}
