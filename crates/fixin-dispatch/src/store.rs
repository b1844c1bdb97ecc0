//! # Store Contracts
//!
//! The engine talks to durable state through two object-safe traits.
//! [`DispatchStore`] serves plain reads and opens transactions;
//! [`DispatchTx`] is one transition's unit of work. Dropping a transaction
//! without calling [`DispatchTx::commit`] rolls it back and releases every
//! lock it holds.
//!
//! ## Lock ordering
//!
//! A transaction locks the request first ([`DispatchTx::lock_request`]) and
//! the agent second (inside [`DispatchTx::debit`] / [`DispatchTx::credit`]).
//! [`DispatchTx::agent_balance`] is a plain read and takes no lock. Keeping
//! this order in every transition means Accept and a refunding Cancel can
//! never wait on each other in a cycle.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fixin_core::{AgentId, ClientId, Credits, RequestId, ServiceTypeId};
use fixin_state::{
    AgentRating, Assignment, BucketKind, CancellationRecord, CompletionRecord, LedgerEntry,
    LedgerReason, RequestSnapshot, ServiceRequest,
};

use crate::error::StoreError;

// ─── Profiles ────────────────────────────────────────────────────────

/// What the engine needs to know about a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub id: ClientId,
    pub display_name: String,
    pub push_token: Option<String>,
    /// Clients must finish onboarding before submitting requests.
    pub profile_complete: bool,
}

/// Agent availability as reported by the agent app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// What the engine needs to know about an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub display_name: String,
    pub push_token: Option<String>,
    pub status: AgentStatus,
    pub balance: Credits,
}

/// A requestable service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: ServiceTypeId,
    pub name: String,
}

/// A pending request as it appears in one agent's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOffer {
    pub request: ServiceRequest,
    pub expires_at: DateTime<Utc>,
    pub service_name: String,
    /// Geodesic distance from the agent's location to the request origin.
    pub distance_m: f64,
}

// ─── Traits ──────────────────────────────────────────────────────────

/// Durable request, ledger and profile storage.
#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Open a transaction whose lock waits are bounded by `lock_timeout`.
    async fn begin(&self, lock_timeout: Duration) -> Result<Box<dyn DispatchTx>, StoreError>;

    async fn client(&self, id: ClientId) -> Result<Option<ClientProfile>, StoreError>;

    async fn agent(&self, id: AgentId) -> Result<Option<AgentProfile>, StoreError>;

    async fn service_type(&self, id: ServiceTypeId) -> Result<Option<ServiceType>, StoreError>;

    /// Unlocked read of a request and its current bucket.
    async fn snapshot(&self, id: RequestId) -> Result<Option<RequestSnapshot>, StoreError>;

    /// An agent's ledger entries, newest first.
    async fn ledger_for_agent(
        &self,
        agent: AgentId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Unexpired pending requests the agent could accept: the agent offers
    /// the service with it enabled and shares an operating zone with the
    /// origin. Nearest first, oldest first among equals. Online status is
    /// not required, so a reconnecting agent can rebuild its queue.
    async fn pending_for_agent(
        &self,
        agent: AgentId,
        now: DateTime<Utc>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PendingOffer>, StoreError>;

    /// Requests currently `Assigned` to the agent, most recently accepted
    /// first.
    async fn active_for_agent(
        &self,
        agent: AgentId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RequestSnapshot>, StoreError>;

    /// Every request the client submitted, in any bucket, most recent
    /// activity first.
    async fn requests_for_client(
        &self,
        client: ClientId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RequestSnapshot>, StoreError>;

    /// Pending requests whose expiry deadline is at or before `now`.
    async fn expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<RequestId>, StoreError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// One transition's unit of work.
#[async_trait]
pub trait DispatchTx: Send {
    /// Take the exclusive per-request lock, waiting at most the
    /// transaction's lock timeout, and return the request with its current
    /// bucket. `None` when the id is unknown.
    async fn lock_request(&mut self, id: RequestId) -> Result<Option<RequestSnapshot>, StoreError>;

    /// Current balance, read without locking. `None` when the agent is
    /// unknown.
    async fn agent_balance(&mut self, agent: AgentId) -> Result<Option<Credits>, StoreError>;

    /// Lock the agent, check its balance covers `amount`, and stage the
    /// debit plus its ledger entry. `None` when the balance is insufficient,
    /// in which case nothing is staged.
    async fn debit(
        &mut self,
        agent: AgentId,
        amount: Credits,
        request: Option<RequestId>,
        reason: LedgerReason,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// Lock the agent and stage a credit plus its ledger entry.
    async fn credit(
        &mut self,
        agent: AgentId,
        amount: Credits,
        request: Option<RequestId>,
        reason: LedgerReason,
    ) -> Result<LedgerEntry, StoreError>;

    /// The acceptance-fee debit recorded for `request`, if any.
    async fn acceptance_debit(
        &mut self,
        request: RequestId,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    async fn insert_pending(
        &mut self,
        request: &ServiceRequest,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Move a locked request from `Pending` to `Assigned`.
    async fn move_to_assigned(&mut self, assignment: &Assignment) -> Result<(), StoreError>;

    /// Move a locked request from `Assigned` to `Completed`.
    async fn move_to_completed(&mut self, record: &CompletionRecord) -> Result<(), StoreError>;

    /// Move a locked request from `from` to `Cancelled`.
    async fn move_to_cancelled(
        &mut self,
        from: BucketKind,
        record: &CancellationRecord,
    ) -> Result<(), StoreError>;

    /// Attach the client's rating of the agent to a completed request.
    async fn record_agent_rating(
        &mut self,
        request: RequestId,
        rating: &AgentRating,
    ) -> Result<(), StoreError>;

    /// Apply every staged write atomically and release all locks.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
