//! # Lifecycle Records
//!
//! The request itself plus the immutable facts created when it changes
//! bucket. Every record here is written exactly once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use fixin_core::{
    bounded_text, AgentId, ClientId, Credits, GeoPoint, LedgerEntryId, Rating, RequestId,
    ServiceTypeId, ValidationError,
};

/// Maximum length of a request's problem description.
pub const DETAILS_MAX_CHARS: usize = 1000;

/// Maximum length of a cancellation reason or rating comment.
pub const REASON_MAX_CHARS: usize = 500;

// ─── Service Request ─────────────────────────────────────────────────

/// One unit of work submitted by a client. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    pub client_id: ClientId,
    pub service_type_id: ServiceTypeId,
    pub origin: GeoPoint,
    /// Free-text problem description, trimmed.
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl ServiceRequest {
    /// Build a new request with a fresh id, validating the description.
    pub fn new(
        client_id: ClientId,
        service_type_id: ServiceTypeId,
        origin: GeoPoint,
        details: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: RequestId::new(),
            client_id,
            service_type_id,
            origin,
            details: bounded_text("details", details, DETAILS_MAX_CHARS)?,
            created_at,
        })
    }
}

// ─── Assignment ──────────────────────────────────────────────────────

/// Binding of a request to the agent that accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub request_id: RequestId,
    pub agent_id: AgentId,
    /// Fee debited at acceptance.
    pub fee: Credits,
    pub assigned_at: DateTime<Utc>,
}

// ─── Terminal Records ────────────────────────────────────────────────

/// The client's later rating of the agent on a completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRating {
    pub rating: Rating,
    pub comment: String,
    pub rated_at: DateTime<Utc>,
}

/// Terminal record of a completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub request_id: RequestId,
    pub agent_id: AgentId,
    /// The agent's rating of the client, given at completion.
    pub client_rating: Rating,
    pub client_comment: String,
    /// Recorded at most once, after completion.
    pub agent_rating: Option<AgentRating>,
    pub completed_at: DateTime<Utc>,
}

/// The party that cancelled a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelInitiator {
    Client,
    Agent,
    /// The expiry reaper.
    System,
}

impl CancelInitiator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Self::Client),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl std::fmt::Display for CancelInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record of a cancelled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub request_id: RequestId,
    pub initiator: CancelInitiator,
    /// The agent that was bound when the request was cancelled, if any.
    pub agent_id: Option<AgentId>,
    pub reason: String,
    /// Amount credited back to the agent. Present iff the request was
    /// cancelled from `Assigned`.
    pub refund: Option<Credits>,
    pub cancelled_at: DateTime<Utc>,
}

// ─── Ledger ──────────────────────────────────────────────────────────

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    AcceptanceFee,
    CancellationRefund,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcceptanceFee => "acceptance_fee",
            Self::CancellationRefund => "cancellation_refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "acceptance_fee" => Some(Self::AcceptanceFee),
            "cancellation_refund" => Some(Self::CancellationRefund),
            _ => None,
        }
    }
}

/// An append-only balance change. `amount` is signed: debits are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub agent_id: AgentId,
    pub amount: Decimal,
    pub reason: LedgerReason,
    pub request_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// A debit of `amount` (stored negative).
    pub fn debit(
        agent_id: AgentId,
        amount: Credits,
        reason: LedgerReason,
        request_id: Option<RequestId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            agent_id,
            amount: -amount.amount(),
            reason,
            request_id,
            created_at,
        }
    }

    /// A credit of `amount` (stored positive).
    pub fn credit(
        agent_id: AgentId,
        amount: Credits,
        reason: LedgerReason,
        request_id: Option<RequestId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LedgerEntryId::new(),
            agent_id,
            amount: amount.amount(),
            reason,
            request_id,
            created_at,
        }
    }

    /// Absolute size of the balance change.
    pub fn magnitude(&self) -> Credits {
        Credits::new(self.amount.abs()).unwrap_or(Credits::ZERO)
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_is_negative_credit_is_positive() {
        let agent = AgentId::new();
        let fee = Credits::from_cents(500);
        let d = LedgerEntry::debit(agent, fee, LedgerReason::AcceptanceFee, None, Utc::now());
        let c = LedgerEntry::credit(agent, fee, LedgerReason::CancellationRefund, None, Utc::now());
        assert_eq!(d.amount, Decimal::new(-500, 2));
        assert!(d.is_debit());
        assert!(!c.is_debit());
        assert_eq!(d.amount + c.amount, Decimal::ZERO);
        assert_eq!(d.magnitude(), fee);
    }

    #[test]
    fn request_details_are_bounded() {
        let origin = GeoPoint::new(-34.6, -58.4).unwrap();
        let long = "x".repeat(DETAILS_MAX_CHARS + 1);
        let err = ServiceRequest::new(
            ClientId::new(),
            ServiceTypeId::new(),
            origin,
            &long,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { field: "details", .. }));
    }

    #[test]
    fn reason_strings_roundtrip() {
        for r in [LedgerReason::AcceptanceFee, LedgerReason::CancellationRefund] {
            assert_eq!(LedgerReason::parse(r.as_str()), Some(r));
        }
        for i in [
            CancelInitiator::Client,
            CancelInitiator::Agent,
            CancelInitiator::System,
        ] {
            assert_eq!(CancelInitiator::parse(i.as_str()), Some(i));
        }
        assert_eq!(CancelInitiator::parse("admin"), None);
    }
}
