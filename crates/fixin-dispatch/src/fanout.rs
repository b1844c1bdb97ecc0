//! # Fanout
//!
//! Real-time state broadcast. Topics are keyed by request (`request:<id>`,
//! joined by the client and anyone tracking the request) and by agent
//! (`agent:<id>`, for "new work" style events). Delivery is at-most-once
//! and best-effort: publishing never blocks and never fails the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use fixin_core::{AgentId, RequestId};

/// Per-topic buffer for [`BroadcastHub`]. Slow subscribers lag and skip.
const TOPIC_CAPACITY: usize = 64;

/// Event names published by the engine.
pub mod events {
    pub const NEW_REQUEST: &str = "new_request";
    pub const REQUEST_ACCEPTED: &str = "request_accepted";
    pub const REQUEST_TAKEN: &str = "request_taken";
    pub const SERVICE_COMPLETED: &str = "service_completed";
    pub const REQUEST_CANCELLED: &str = "request_cancelled";
    pub const REQUEST_WITHDRAWN: &str = "request_withdrawn";
    pub const RATING_RECEIVED: &str = "rating_received";
}

/// A fanout address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    Request(RequestId),
    Agent(AgentId),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(id) => id.fmt(f),
            Self::Agent(id) => id.fmt(f),
        }
    }
}

/// An identifiable event. Subscribers may deduplicate on `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanoutEvent {
    pub id: Uuid,
    pub name: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl FanoutEvent {
    pub fn new(name: &str, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Topic-based publish. Must not block.
pub trait FanoutChannel: Send + Sync {
    fn publish(&self, topic: Topic, event: FanoutEvent);
}

/// In-process fanout over one tokio broadcast channel per topic.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    topics: Arc<DashMap<Topic, broadcast::Sender<FanoutEvent>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a topic. Only events published after this call are received.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<FanoutEvent> {
        self.topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Number of topics with at least one live subscriber. Channels whose
    /// receivers have all been dropped are pruned first.
    pub fn topic_count(&self) -> usize {
        self.topics.retain(|_, sender| sender.receiver_count() > 0);
        self.topics.len()
    }
}

impl FanoutChannel for BroadcastHub {
    fn publish(&self, topic: Topic, event: FanoutEvent) {
        let delivered = match self.topics.get(&topic) {
            Some(sender) => sender.send(event).ok(),
            None => None,
        };
        match delivered {
            Some(receivers) => {
                tracing::trace!(%topic, receivers, "fanout event delivered");
            }
            None => {
                // Nobody listening. Drop the channel so idle topics don't accumulate.
                self.topics
                    .remove_if(&topic, |_, sender| sender.receiver_count() == 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn topic_display_matches_identity_prefix() {
        let id = RequestId::new();
        assert_eq!(Topic::Request(id).to_string(), format!("request:{}", id.0));
        let agent = AgentId::new();
        assert_eq!(Topic::Agent(agent).to_string(), format!("agent:{}", agent.0));
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = BroadcastHub::new();
        let topic = Topic::Agent(AgentId::new());
        let mut rx = hub.subscribe(topic);
        hub.publish(topic, FanoutEvent::new(events::NEW_REQUEST, json!({"x": 1})));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.name, "new_request");
        assert_eq!(ev.payload["x"], 1);
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let hub = BroadcastHub::new();
        let topic = Topic::Request(RequestId::new());
        hub.publish(topic, FanoutEvent::new(events::REQUEST_TAKEN, json!({})));
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn idle_topic_is_pruned_after_last_subscriber_leaves() {
        let hub = BroadcastHub::new();
        let topic = Topic::Request(RequestId::new());
        let rx = hub.subscribe(topic);
        assert_eq!(hub.topic_count(), 1);
        drop(rx);
        hub.publish(topic, FanoutEvent::new(events::REQUEST_TAKEN, json!({})));
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn topic_count_ignores_abandoned_topics() {
        let hub = BroadcastHub::new();
        let kept = hub.subscribe(Topic::Agent(AgentId::new()));
        let abandoned = hub.subscribe(Topic::Request(RequestId::new()));
        assert_eq!(hub.topic_count(), 2);

        drop(abandoned);
        assert_eq!(hub.topic_count(), 1);
        drop(kept);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn events_get_distinct_ids() {
        let a = FanoutEvent::new(events::NEW_REQUEST, json!({}));
        let b = FanoutEvent::new(events::NEW_REQUEST, json!({}));
        assert_ne!(a.id, b.id);
    }
}
