//! Candidate lookup contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fixin_core::{AgentId, GeoPoint, ServiceTypeId};

use crate::error::StoreError;
use crate::fanout::Topic;

/// An agent eligible to receive a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub agent_id: AgentId,
    /// Fanout address of the agent.
    pub channel: Topic,
    pub push_token: Option<String>,
    /// Distance from the request origin, metres.
    pub distance_m: f64,
}

impl Candidate {
    pub fn new(agent_id: AgentId, push_token: Option<String>, distance_m: f64) -> Self {
        Self {
            agent_id,
            channel: Topic::Agent(agent_id),
            push_token,
            distance_m,
        }
    }
}

/// Finds agents that are online, have the service type enabled, and
/// operate in a zone containing the origin. Results are ordered nearest
/// first. An empty result is a normal outcome.
#[async_trait]
pub trait CandidateLocator: Send + Sync {
    async fn candidates(
        &self,
        service_type: ServiceTypeId,
        origin: GeoPoint,
    ) -> Result<Vec<Candidate>, StoreError>;
}
