//! # fixin-push: Push Notification Sender
//!
//! Delivers [`PushMessage`]s to a push gateway over HTTPS. The wire format
//! is the gateway's single-message send envelope:
//!
//! ```json
//! {
//!   "message": {
//!     "token": "<device token>",
//!     "notification": { "title": "...", "body": "..." },
//!     "data": { "request_id": "...", "click_action": "FLUTTER_NOTIFICATION_CLICK" }
//!   }
//! }
//! ```
//!
//! Data values are flattened to strings because the gateway only accepts
//! string maps. Delivery is best-effort: [`PushClient`] reports failures to
//! its caller, and the dispatch engine only logs them.

pub mod config;

pub use config::{ConfigError, PushConfig};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use fixin_dispatch::{Notifier, NotifyError, PushMessage};

/// Click action the mobile apps route on.
const CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    message: WireMessage<'a>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    token: &'a str,
    notification: WireNotification<'a>,
    data: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct WireNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// HTTP [`Notifier`].
#[derive(Debug, Clone)]
pub struct PushClient {
    http: reqwest::Client,
    endpoint: url::Url,
}

impl PushClient {
    /// Create a push client from configuration.
    pub fn new(config: PushConfig) -> Result<Self, NotifyError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.server_key))
                .map_err(|_| NotifyError::Transport("push key is not a valid header value".into()))?,
        );
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint,
        })
    }
}

/// Flatten a JSON object into the string map the gateway expects.
fn flatten_data(data: &serde_json::Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let serde_json::Value::Object(map) = data {
        for (key, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => continue,
                other => other.to_string(),
            };
            out.insert(key.clone(), rendered);
        }
    }
    out.insert("click_action".to_string(), CLICK_ACTION.to_string());
    out
}

#[async_trait]
impl Notifier for PushClient {
    async fn send(&self, message: PushMessage) -> Result<(), NotifyError> {
        let envelope = Envelope {
            message: WireMessage {
                token: &message.token,
                notification: WireNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: flatten_data(&message.data),
            },
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        tracing::debug!(title = %message.title, "push notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_values_become_strings() {
        let data = flatten_data(&json!({
            "request_id": "abc",
            "distance_m": 1200.5,
            "urgent": true,
            "missing": null,
        }));
        assert_eq!(data["request_id"], "abc");
        assert_eq!(data["distance_m"], "1200.5");
        assert_eq!(data["urgent"], "true");
        assert!(!data.contains_key("missing"));
        assert_eq!(data["click_action"], CLICK_ACTION);
    }

    #[test]
    fn non_object_data_yields_only_click_action() {
        let data = flatten_data(&json!([1, 2]));
        assert_eq!(data.len(), 1);
    }
}
