//! # Notifications
//!
//! Best-effort push delivery. The engine hands each message to
//! [`send_detached`], which runs the send on its own task and only logs the
//! outcome. A failed or cancelled send never changes the result of the
//! operation that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

/// A push notification addressed to one device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    /// Opaque metadata forwarded to the device.
    pub data: serde_json::Value,
}

/// Notification delivery failure.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("push transport error: {0}")]
    Transport(String),

    #[error("push gateway rejected message with status {status}")]
    Rejected { status: u16 },
}

/// Push-notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: PushMessage) -> Result<(), NotifyError>;
}

/// Notifier that only logs. Used when no push gateway is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: PushMessage) -> Result<(), NotifyError> {
        tracing::debug!(title = %message.title, "push gateway not configured, notification dropped");
        Ok(())
    }
}

/// Send `message` on a detached task and log failures at `warn`.
pub fn send_detached(notifier: Arc<dyn Notifier>, message: PushMessage) -> JoinHandle<()> {
    tokio::spawn(async move {
        let title = message.title.clone();
        if let Err(e) = notifier.send(message).await {
            tracing::warn!(error = %e, %title, "push notification failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _message: PushMessage) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected { status: 503 })
        }
    }

    fn message() -> PushMessage {
        PushMessage {
            token: "tok".into(),
            title: "t".into(),
            body: "b".into(),
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn detached_failure_is_swallowed() {
        let handle = send_detached(Arc::new(FailingNotifier), message());
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn log_notifier_accepts_everything() {
        assert!(LogNotifier.send(message()).await.is_ok());
    }
}
