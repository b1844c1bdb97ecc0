//! # Request Lifecycle
//!
//! Bucket membership and the guarded transitions between buckets.
//!
//! Every transition method on [`RequestSnapshot`] checks, in order:
//!
//! 1. terminal buckets reject everything,
//! 2. the current bucket matches the transition,
//! 3. the acting party is allowed to perform it,
//!
//! and returns the record for the next bucket. The caller persists that
//! record while still holding the request lock, so the snapshot the check
//! ran against is the state the write replaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fixin_core::{bounded_text, AgentId, ClientId, Credits, Rating};

use crate::records::{
    AgentRating, Assignment, CancelInitiator, CancellationRecord, CompletionRecord,
    ServiceRequest, REASON_MAX_CHARS,
};

// ─── Buckets ─────────────────────────────────────────────────────────

/// Discriminant of [`RequestBucket`], used for storage and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKind {
    Pending,
    Assigned,
    Completed,
    Cancelled,
}

impl BucketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for BucketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle bucket a request currently belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bucket", rename_all = "snake_case")]
pub enum RequestBucket {
    /// Waiting for an agent. Ineligible for acceptance once `expires_at`
    /// has passed, even while still physically present.
    Pending { expires_at: DateTime<Utc> },
    Assigned(Assignment),
    Completed(CompletionRecord),
    Cancelled(CancellationRecord),
}

impl RequestBucket {
    pub fn kind(&self) -> BucketKind {
        match self {
            Self::Pending { .. } => BucketKind::Pending,
            Self::Assigned(_) => BucketKind::Assigned,
            Self::Completed(_) => BucketKind::Completed,
            Self::Cancelled(_) => BucketKind::Cancelled,
        }
    }

    /// The agent bound to the request, now or at the moment it left
    /// `Assigned`.
    pub fn bound_agent(&self) -> Option<AgentId> {
        match self {
            Self::Pending { .. } => None,
            Self::Assigned(a) => Some(a.agent_id),
            Self::Completed(c) => Some(c.agent_id),
            Self::Cancelled(c) => c.agent_id,
        }
    }

    /// Whether a pending request has passed its expiry deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::Pending { expires_at } if now >= *expires_at)
    }
}

// ─── Actors ──────────────────────────────────────────────────────────

/// The party performing a transition or reading a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actor {
    Client(ClientId),
    Agent(AgentId),
    System,
}

impl Actor {
    pub fn initiator(&self) -> CancelInitiator {
        match self {
            Self::Client(_) => CancelInitiator::Client,
            Self::Agent(_) => CancelInitiator::Agent,
            Self::System => CancelInitiator::System,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// A transition was rejected by its guard.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// The pending request passed its expiry deadline.
    #[error("request expired at {expires_at}")]
    Expired {
        expires_at: DateTime<Utc>,
    },

    /// The transition requires `Pending`.
    #[error("request is {actual}, not pending")]
    NotPending { actual: BucketKind },

    /// The transition requires `Assigned`.
    #[error("request is {actual}, not assigned")]
    NotAssigned { actual: BucketKind },

    /// The request is `Completed` or `Cancelled`.
    #[error("request is already {actual}")]
    AlreadyTerminal { actual: BucketKind },

    /// The request is pending and has not expired yet.
    #[error("request has not expired")]
    NotExpired,

    /// The acting agent is not the one bound to the request.
    #[error("agent is not bound to this request")]
    NotBoundAgent,

    /// The acting client does not own the request.
    #[error("client does not own this request")]
    NotOwner,

    /// The agent has already been rated for this request.
    #[error("agent already rated for this request")]
    AlreadyRated,

    /// The transition requires `Completed`.
    #[error("request is {actual}, not completed")]
    NotCompleted { actual: BucketKind },
}

impl LifecycleError {
    /// Whether the rejection is about who is acting rather than about the
    /// request's state.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::NotBoundAgent | Self::NotOwner)
    }
}

// ─── Snapshot and Transitions ────────────────────────────────────────

/// A request together with its current bucket, as read under lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub request: ServiceRequest,
    pub bucket: RequestBucket,
}

impl RequestSnapshot {
    pub fn kind(&self) -> BucketKind {
        self.bucket.kind()
    }

    /// When the request entered its current bucket.
    pub fn last_activity(&self) -> DateTime<Utc> {
        match &self.bucket {
            RequestBucket::Pending { .. } => self.request.created_at,
            RequestBucket::Assigned(a) => a.assigned_at,
            RequestBucket::Completed(c) => c.completed_at,
            RequestBucket::Cancelled(c) => c.cancelled_at,
        }
    }

    /// Claim a pending request for `agent_id`.
    ///
    /// Balance is checked by the ledger, not here.
    pub fn assign(
        &self,
        agent_id: AgentId,
        fee: Credits,
        now: DateTime<Utc>,
    ) -> Result<Assignment, LifecycleError> {
        self.reject_terminal()?;
        let RequestBucket::Pending { expires_at } = self.bucket else {
            return Err(LifecycleError::NotPending {
                actual: self.kind(),
            });
        };
        if now >= expires_at {
            return Err(LifecycleError::Expired { expires_at });
        }
        Ok(Assignment {
            request_id: self.request.id,
            agent_id,
            fee,
            assigned_at: now,
        })
    }

    /// Finish an assigned request. Only the bound agent may complete it.
    pub fn complete(
        &self,
        agent_id: AgentId,
        client_rating: Rating,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<CompletionRecord, LifecycleError> {
        let assignment = self.require_assigned()?;
        if assignment.agent_id != agent_id {
            return Err(LifecycleError::NotBoundAgent);
        }
        Ok(CompletionRecord {
            request_id: self.request.id,
            agent_id,
            client_rating,
            client_comment: clip(comment),
            agent_rating: None,
            completed_at: now,
        })
    }

    /// Cancel the request on behalf of `actor`.
    ///
    /// From `Pending` only the owning client may cancel, or the system once
    /// the request has expired. From `Assigned` the owning client or the
    /// bound agent may cancel, and the returned record carries the refund of
    /// the acceptance fee.
    pub fn cancel(
        &self,
        actor: Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<CancellationRecord, LifecycleError> {
        self.reject_terminal()?;
        let (agent_id, refund) = match (&self.bucket, actor) {
            (RequestBucket::Pending { .. }, Actor::Client(client)) => {
                self.require_owner(client)?;
                (None, None)
            }
            (RequestBucket::Pending { .. }, Actor::Agent(_)) => {
                return Err(LifecycleError::NotBoundAgent)
            }
            (RequestBucket::Pending { .. }, Actor::System) => {
                if !self.bucket.is_expired(now) {
                    return Err(LifecycleError::NotExpired);
                }
                (None, None)
            }
            (RequestBucket::Assigned(a), Actor::Client(client)) => {
                self.require_owner(client)?;
                (Some(a.agent_id), Some(a.fee))
            }
            (RequestBucket::Assigned(a), Actor::Agent(agent)) => {
                if a.agent_id != agent {
                    return Err(LifecycleError::NotBoundAgent);
                }
                (Some(a.agent_id), Some(a.fee))
            }
            (RequestBucket::Assigned(_), Actor::System) => {
                return Err(LifecycleError::NotPending {
                    actual: BucketKind::Assigned,
                })
            }
            (RequestBucket::Completed(_) | RequestBucket::Cancelled(_), _) => {
                return Err(LifecycleError::AlreadyTerminal {
                    actual: self.kind(),
                })
            }
        };
        Ok(CancellationRecord {
            request_id: self.request.id,
            initiator: actor.initiator(),
            agent_id,
            reason: clip(reason),
            refund,
            cancelled_at: now,
        })
    }

    /// Record the owning client's rating of the agent on a completed
    /// request. Allowed once.
    pub fn rate_agent(
        &self,
        client_id: ClientId,
        rating: Rating,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<AgentRating, LifecycleError> {
        let RequestBucket::Completed(record) = &self.bucket else {
            return Err(LifecycleError::NotCompleted {
                actual: self.kind(),
            });
        };
        self.require_owner(client_id)?;
        if record.agent_rating.is_some() {
            return Err(LifecycleError::AlreadyRated);
        }
        Ok(AgentRating {
            rating,
            comment: clip(comment),
            rated_at: now,
        })
    }

    /// Whether `actor` may read this request: the owning client, or the
    /// agent bound to it now or at the moment it left `Assigned`.
    pub fn visible_to(&self, actor: Actor) -> bool {
        match actor {
            Actor::Client(client) => self.request.client_id == client,
            Actor::Agent(agent) => self.bucket.bound_agent() == Some(agent),
            Actor::System => true,
        }
    }

    fn reject_terminal(&self) -> Result<(), LifecycleError> {
        let kind = self.kind();
        if kind.is_terminal() {
            return Err(LifecycleError::AlreadyTerminal { actual: kind });
        }
        Ok(())
    }

    fn require_assigned(&self) -> Result<&Assignment, LifecycleError> {
        self.reject_terminal()?;
        match &self.bucket {
            RequestBucket::Assigned(a) => Ok(a),
            other => Err(LifecycleError::NotAssigned {
                actual: other.kind(),
            }),
        }
    }

    fn require_owner(&self, client_id: ClientId) -> Result<(), LifecycleError> {
        if self.request.client_id != client_id {
            return Err(LifecycleError::NotOwner);
        }
        Ok(())
    }
}

/// Comments and reasons are free text; oversize input is truncated rather
/// than rejected here. The engine validates before reaching this point.
fn clip(text: &str) -> String {
    bounded_text("text", text, REASON_MAX_CHARS)
        .unwrap_or_else(|_| text.trim().chars().take(REASON_MAX_CHARS).collect())
}

// ─── Tests ───────────────────────────────────────────────────────────
