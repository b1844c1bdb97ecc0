//! # Service Bootstrap
//!
//! Wires the dispatch engine to its collaborators: PostgreSQL store and
//! PostGIS locator when a pool is available, the in-memory pair otherwise;
//! the HTTP push client when configured, the log-only notifier otherwise.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use fixin_dispatch::{
    BroadcastHub, CandidateLocator, DispatchConfig, DispatchEngine, DispatchStore, LogNotifier,
    MemoryStore, Notifier,
};
use fixin_push::{PushClient, PushConfig};

use crate::db::{PgLocator, PgStore};
use crate::state::{AppConfig, AppState};

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("dispatch configuration: {0}")]
    Dispatch(#[from] fixin_dispatch::ConfigError),

    #[error("push configuration: {0}")]
    Push(#[from] fixin_push::ConfigError),

    #[error("push client: {0}")]
    PushClient(#[from] fixin_dispatch::NotifyError),
}

/// Load the engine tunables from `FIXIN_*` variables.
pub fn dispatch_config_from_env() -> Result<DispatchConfig, BootstrapError> {
    dispatch_config_from_lookup(|key| std::env::var(key).ok())
}

fn dispatch_config_from_lookup<F>(lookup: F) -> Result<DispatchConfig, BootstrapError>
where
    F: Fn(&str) -> Option<String>,
{
    let config = DispatchConfig::from_lookup(lookup)?;
    tracing::info!(?config, "dispatch configuration loaded");
    Ok(config)
}

/// Build the notifier from `FIXIN_PUSH_*`, falling back to logging only.
pub fn notifier_from_env() -> Result<Arc<dyn Notifier>, BootstrapError> {
    match PushConfig::from_env()? {
        Some(push) => {
            tracing::info!(endpoint = %push.endpoint, "push gateway configured");
            Ok(Arc::new(PushClient::new(push)?))
        }
        None => {
            tracing::warn!("FIXIN_PUSH_URL not set, push notifications will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Assemble application state.
pub fn bootstrap(
    config: AppConfig,
    dispatch: DispatchConfig,
    notifier: Arc<dyn Notifier>,
    pool: Option<PgPool>,
) -> AppState {
    let (store, locator): (Arc<dyn DispatchStore>, Arc<dyn CandidateLocator>) = match pool {
        Some(pool) => (
            Arc::new(PgStore::new(pool.clone())),
            Arc::new(PgLocator::new(pool)),
        ),
        None => {
            let memory = MemoryStore::new();
            let locator = Arc::new(memory.locator());
            (Arc::new(memory), locator)
        }
    };
    let hub = BroadcastHub::new();
    let engine = DispatchEngine::new(store, locator, Arc::new(hub.clone()), notifier, dispatch);
    AppState::new(Arc::new(engine), hub, config)
}
