//! Optional background sweep that expires stale pending requests.
//!
//! Acceptance already rejects expired requests on its own; the reaper only
//! tidies them into `Cancelled` so candidates stop seeing them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::DispatchEngine;

/// Spawn the reaper loop. It sweeps once per `interval` and exits when
/// `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_reaper(
    engine: Arc<DispatchEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "expiry reaper started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(err) = engine.expire_pending(Utc::now()).await {
                tracing::warn!(error = %err, "expiry sweep failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("expiry reaper stopped");
    })
}
