//! Shared harness for engine tests: an in-memory store seeded with one
//! operating zone, one service type and one client, plus recording fanout
//! and notifier doubles.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use fixin_core::{AgentId, ClientId, Credits, GeoPoint, GeoPolygon, ServiceTypeId};
use fixin_dispatch::{
    AgentProfile, AgentStatus, Candidate, CandidateLocator, ClientProfile, DispatchConfig,
    DispatchEngine, FanoutChannel, FanoutEvent, MemoryStore, Notifier, NotifyError, PushMessage,
    ServiceType, StoreError, Topic,
};

// ─── Doubles ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingFanout {
    events: Mutex<Vec<(Topic, FanoutEvent)>>,
}

impl RecordingFanout {
    pub fn all(&self) -> Vec<(Topic, FanoutEvent)> {
        self.events.lock().clone()
    }

    pub fn named(&self, name: &str) -> Vec<(Topic, FanoutEvent)> {
        self.all().into_iter().filter(|(_, e)| e.name == name).collect()
    }

    pub fn topics_for(&self, name: &str) -> Vec<Topic> {
        self.named(name).into_iter().map(|(t, _)| t).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl FanoutChannel for RecordingFanout {
    fn publish(&self, topic: Topic, event: FanoutEvent) {
        self.events.lock().push((topic, event));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<PushMessage>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn tokens(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.token.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: PushMessage) -> Result<(), NotifyError> {
        self.sent.lock().push(message);
        if self.fail {
            return Err(NotifyError::Transport("gateway unreachable".into()));
        }
        Ok(())
    }
}

pub struct BrokenLocator;

#[async_trait]
impl CandidateLocator for BrokenLocator {
    async fn candidates(
        &self,
        _service_type: ServiceTypeId,
        _origin: GeoPoint,
    ) -> Result<Vec<Candidate>, StoreError> {
        Err(StoreError::Backend("postgis unavailable".into()))
    }
}

// ─── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub engine: Arc<DispatchEngine>,
    pub store: MemoryStore,
    pub fanout: Arc<RecordingFanout>,
    pub notifier: Arc<RecordingNotifier>,
    pub client: ClientId,
    pub service: ServiceTypeId,
    pub origin: GeoPoint,
}

pub fn point(lat: f64, lon: f64) -> GeoPoint {
    GeoPoint::new(lat, lon).unwrap()
}

pub fn credits(cents: u32) -> Credits {
    Credits::from_cents(cents)
}

pub fn harness() -> Harness {
    build(DispatchConfig::default(), RecordingNotifier::default(), None)
}

pub fn build(
    config: DispatchConfig,
    notifier: RecordingNotifier,
    locator: Option<Arc<dyn CandidateLocator>>,
) -> Harness {
    let store = MemoryStore::new();
    store.add_zone(
        GeoPolygon::new(vec![
            point(-32.0, -65.0),
            point(-32.0, -64.0),
            point(-31.0, -64.0),
            point(-31.0, -65.0),
        ])
        .unwrap(),
    );
    let service = ServiceTypeId::new();
    store.add_service_type(ServiceType {
        id: service,
        name: "Tow truck".into(),
    });
    let client = ClientId::new();
    store.add_client(ClientProfile {
        id: client,
        display_name: "Ana".into(),
        push_token: Some("client-token".into()),
        profile_complete: true,
    });

    let fanout = Arc::new(RecordingFanout::default());
    let notifier = Arc::new(notifier);
    let locator = locator.unwrap_or_else(|| Arc::new(store.locator()));
    let engine = Arc::new(DispatchEngine::new(
        Arc::new(store.clone()),
        locator,
        fanout.clone(),
        notifier.clone(),
        config,
    ));

    Harness {
        engine,
        store,
        fanout,
        notifier,
        client,
        service,
        origin: point(-31.40, -64.20),
    }
}

impl Harness {
    /// An online agent inside the zone offering the harness service.
    pub fn agent(&self, balance_cents: u32) -> AgentId {
        self.agent_at(balance_cents, point(-31.41, -64.21))
    }

    pub fn agent_at(&self, balance_cents: u32, location: GeoPoint) -> AgentId {
        let id = AgentId::new();
        self.store.add_agent(
            AgentProfile {
                id,
                display_name: format!("Agent {}", &id.0.to_string()[..8]),
                push_token: Some(format!("agent-token-{}", id.0)),
                status: AgentStatus::Online,
                balance: credits(balance_cents),
            },
            location,
            &[self.service],
        );
        id
    }

    pub async fn create(&self) -> fixin_core::RequestId {
        self.engine
            .create_request(self.client, self.service, self.origin, "flat tyre on route 20")
            .await
            .unwrap()
    }
}

/// Give detached notification tasks a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
