//! # Agent API
//!
//! Agent-scoped reads: the queue of requests the agent may still accept,
//! the jobs it currently holds, and its credit ledger.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use fixin_dispatch::PendingOffer;
use fixin_state::LedgerEntry;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::routes::requests::RequestPage;
use crate::routes::PageQuery;
use crate::state::AppState;

/// A pending request the agent could accept right now.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingOfferView {
    pub request_id: Uuid,
    pub service_type_id: Uuid,
    pub service_name: String,
    pub details: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Distance from the agent's last known location, in metres.
    pub distance_m: f64,
}

impl From<PendingOffer> for PendingOfferView {
    fn from(offer: PendingOffer) -> Self {
        let request = offer.request;
        Self {
            request_id: request.id.0,
            service_type_id: request.service_type_id.0,
            service_name: offer.service_name,
            details: request.details,
            latitude: request.origin.latitude(),
            longitude: request.origin.longitude(),
            created_at: request.created_at,
            expires_at: offer.expires_at,
            distance_m: offer.distance_m,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingPage {
    pub page: u32,
    pub limit: u32,
    pub offers: Vec<PendingOfferView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntryView {
    pub id: Uuid,
    /// Signed decimal string: negative for debits, positive for credits.
    pub amount: String,
    /// `acceptance_fee` or `cancellation_refund`.
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryView {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.0,
            amount: format!("{:.2}", entry.amount),
            reason: entry.reason.as_str().to_string(),
            request_id: entry.request_id.map(|r| r.0),
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LedgerPage {
    pub page: u32,
    pub limit: u32,
    pub entries: Vec<LedgerEntryView>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/agents/me/pending", get(pending_queue))
        .route("/v1/agents/me/active", get(active_jobs))
        .route("/v1/agents/me/ledger", get(ledger_history))
}

/// GET /v1/agents/me/pending: Unexpired requests the agent may accept, nearest first.
#[utoipa::path(
    get,
    path = "/v1/agents/me/pending",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of acceptable requests", body = PendingPage),
        (status = 403, description = "Caller is not an agent", body = crate::error::ErrorBody),
        (status = 422, description = "Page size out of range", body = crate::error::ErrorBody),
    ),
    tag = "agents"
)]
async fn pending_queue(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<PendingPage>, AppError> {
    let agent_id = caller.require_agent()?;
    let offers = state
        .engine
        .pending_queue(agent_id, query.page, query.limit)
        .await?;
    let (page, limit) = query.resolved();
    Ok(Json(PendingPage {
        page,
        limit,
        offers: offers.into_iter().map(Into::into).collect(),
    }))
}

/// GET /v1/agents/me/active: Requests bound to the agent, newest first.
#[utoipa::path(
    get,
    path = "/v1/agents/me/active",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of assigned requests", body = RequestPage),
        (status = 403, description = "Caller is not an agent", body = crate::error::ErrorBody),
        (status = 422, description = "Page size out of range", body = crate::error::ErrorBody),
    ),
    tag = "agents"
)]
async fn active_jobs(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<RequestPage>, AppError> {
    let agent_id = caller.require_agent()?;
    let jobs = state
        .engine
        .active_jobs(agent_id, query.page, query.limit)
        .await?;
    let (page, limit) = query.resolved();
    Ok(Json(RequestPage {
        page,
        limit,
        requests: jobs.into_iter().map(Into::into).collect(),
    }))
}

/// GET /v1/agents/me/ledger: The calling agent's ledger, newest first.
#[utoipa::path(
    get,
    path = "/v1/agents/me/ledger",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of ledger entries", body = LedgerPage),
        (status = 403, description = "Caller is not an agent", body = crate::error::ErrorBody),
        (status = 422, description = "Page size out of range", body = crate::error::ErrorBody),
    ),
    tag = "agents"
)]
async fn ledger_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<LedgerPage>, AppError> {
    let agent_id = caller.require_agent()?;
    let entries = state
        .engine
        .ledger_history(agent_id, query.page, query.limit)
        .await?;
    let (page, limit) = query.resolved();
    Ok(Json(LedgerPage {
        page,
        limit,
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixin_core::{AgentId, ClientId, Credits, GeoPoint, RequestId, ServiceTypeId};
    use fixin_state::{LedgerReason, ServiceRequest};

    #[test]
    fn debit_renders_negative_two_decimals() {
        let entry = LedgerEntry::debit(
            AgentId::new(),
            Credits::from_cents(500),
            LedgerReason::AcceptanceFee,
            Some(RequestId::new()),
            Utc::now(),
        );
        let view = LedgerEntryView::from(entry);
        assert_eq!(view.amount, "-5.00");
        assert_eq!(view.reason, "acceptance_fee");
        assert!(view.request_id.is_some());
    }

    #[test]
    fn credit_renders_positive() {
        let entry = LedgerEntry::credit(
            AgentId::new(),
            Credits::from_cents(1250),
            LedgerReason::CancellationRefund,
            None,
            Utc::now(),
        );
        assert_eq!(LedgerEntryView::from(entry).amount, "12.50");
    }

    #[test]
    fn pending_offer_view_flattens_the_request() {
        let request = ServiceRequest::new(
            ClientId::new(),
            ServiceTypeId::new(),
            GeoPoint::new(-31.4, -64.2).unwrap(),
            "leaking tap",
            Utc::now(),
        )
        .unwrap();
        let request_id = request.id;
        let expires_at = request.created_at + chrono::Duration::minutes(30);
        let view = PendingOfferView::from(PendingOffer {
            request,
            expires_at,
            service_name: "Plumbing".into(),
            distance_m: 1250.5,
        });
        assert_eq!(view.request_id, request_id.0);
        assert_eq!(view.service_name, "Plumbing");
        assert_eq!(view.details, "leaking tap");
        assert_eq!(view.expires_at, expires_at);
        assert!((view.latitude + 31.4).abs() < 1e-9);
    }

    #[test]
    fn page_query_applies_defaults() {
        assert_eq!(PageQuery::default().resolved(), (0, 20));
        let query = PageQuery {
            page: Some(3),
            limit: Some(5),
        };
        assert_eq!(query.resolved(), (3, 5));
    }
}
