//! # Service Request API
//!
//! Lifecycle endpoints for a single service request: create, read,
//! accept, complete, cancel and rate, plus the client's request history.
//! Every handler resolves the caller to a client or agent and delegates to
//! the dispatch engine.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use fixin_core::{GeoPoint, Rating, RequestId, ServiceTypeId};
use fixin_state::{
    AgentRating, Assignment, CancellationRecord, CompletionRecord, RequestBucket,
    RequestSnapshot,
};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::routes::PageQuery;
use crate::state::AppState;

// ── Request DTOs ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRequestBody {
    pub service_type_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    /// Free-text description, at most 1000 characters.
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteRequestBody {
    /// The agent's rating of the client, 1 to 5.
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelRequestBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RateAgentBody {
    /// The client's rating of the agent, 1 to 5.
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

// ── Response DTOs ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedRequest {
    pub request_id: Uuid,
}

/// A request with the details of its current lifecycle bucket.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestView {
    pub request_id: Uuid,
    pub client_id: Uuid,
    pub service_type_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub details: String,
    pub created_at: DateTime<Utc>,
    /// `pending`, `assigned`, `completed` or `cancelled`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<RequestSnapshot> for RequestView {
    fn from(snapshot: RequestSnapshot) -> Self {
        let request = snapshot.request;
        let mut view = RequestView {
            request_id: request.id.0,
            client_id: request.client_id.0,
            service_type_id: request.service_type_id.0,
            latitude: request.origin.latitude(),
            longitude: request.origin.longitude(),
            details: request.details,
            created_at: request.created_at,
            status: snapshot.bucket.kind().as_str().to_string(),
            expires_at: None,
            agent_id: snapshot.bucket.bound_agent().map(|a| a.0),
            fee: None,
            assigned_at: None,
            client_rating: None,
            agent_rating: None,
            completed_at: None,
            cancelled_by: None,
            cancel_reason: None,
            refund: None,
            cancelled_at: None,
        };
        match snapshot.bucket {
            RequestBucket::Pending { expires_at } => view.expires_at = Some(expires_at),
            RequestBucket::Assigned(a) => {
                view.fee = Some(a.fee.to_string());
                view.assigned_at = Some(a.assigned_at);
            }
            RequestBucket::Completed(c) => {
                view.client_rating = Some(c.client_rating.stars());
                view.agent_rating = c.agent_rating.map(|r| r.rating.stars());
                view.completed_at = Some(c.completed_at);
            }
            RequestBucket::Cancelled(c) => {
                view.cancelled_by = Some(c.initiator.as_str().to_string());
                view.cancel_reason = Some(c.reason);
                view.refund = c.refund.map(|r| r.to_string());
                view.cancelled_at = Some(c.cancelled_at);
            }
        }
        view
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RequestPage {
    pub page: u32,
    pub limit: u32,
    pub requests: Vec<RequestView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AssignmentView {
    pub request_id: Uuid,
    pub agent_id: Uuid,
    /// Acceptance fee debited, as a decimal string.
    pub fee: String,
    pub assigned_at: DateTime<Utc>,
}

impl From<Assignment> for AssignmentView {
    fn from(a: Assignment) -> Self {
        Self {
            request_id: a.request_id.0,
            agent_id: a.agent_id.0,
            fee: a.fee.to_string(),
            assigned_at: a.assigned_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CompletionView {
    pub request_id: Uuid,
    pub agent_id: Uuid,
    pub client_rating: u8,
    pub completed_at: DateTime<Utc>,
}

impl From<CompletionRecord> for CompletionView {
    fn from(c: CompletionRecord) -> Self {
        Self {
            request_id: c.request_id.0,
            agent_id: c.agent_id.0,
            client_rating: c.client_rating.stars(),
            completed_at: c.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CancellationView {
    pub request_id: Uuid,
    /// `client`, `agent` or `system`.
    pub cancelled_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    pub reason: String,
    /// Amount credited back to the agent, when the request was assigned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

impl From<CancellationRecord> for CancellationView {
    fn from(c: CancellationRecord) -> Self {
        Self {
            request_id: c.request_id.0,
            cancelled_by: c.initiator.as_str().to_string(),
            agent_id: c.agent_id.map(|a| a.0),
            reason: c.reason,
            refund: c.refund.map(|r| r.to_string()),
            cancelled_at: c.cancelled_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RatingView {
    pub request_id: Uuid,
    pub rating: u8,
    pub comment: String,
    pub rated_at: DateTime<Utc>,
}

impl RatingView {
    fn new(request_id: RequestId, rating: AgentRating) -> Self {
        Self {
            request_id: request_id.0,
            rating: rating.rating.stars(),
            comment: rating.comment,
            rated_at: rating.rated_at,
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/requests", post(create_request).get(list_requests))
        .route("/v1/requests/:id", get(get_request))
        .route("/v1/requests/:id/accept", post(accept_request))
        .route("/v1/requests/:id/complete", post(complete_request))
        .route("/v1/requests/:id/cancel", post(cancel_request))
        .route("/v1/requests/:id/rating", post(rate_agent))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/requests: Submit a new service request.
#[utoipa::path(
    post,
    path = "/v1/requests",
    request_body = CreateRequestBody,
    responses(
        (status = 201, description = "Request created and announced", body = CreatedRequest),
        (status = 404, description = "Client or service type not found", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid request", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn create_request(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedRequest>), AppError> {
    let client_id = caller.require_client()?;
    let body = extract_json(body)?;
    let origin = GeoPoint::new(body.latitude, body.longitude)?;
    let request_id = state
        .engine
        .create_request(
            client_id,
            ServiceTypeId(body.service_type_id),
            origin,
            &body.details,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedRequest {
            request_id: request_id.0,
        }),
    ))
}

/// GET /v1/requests: The calling client's requests, most recent activity first.
#[utoipa::path(
    get,
    path = "/v1/requests",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of the client's requests across all states", body = RequestPage),
        (status = 403, description = "Caller is not a client", body = crate::error::ErrorBody),
        (status = 422, description = "Page size out of range", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn list_requests(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<PageQuery>,
) -> Result<Json<RequestPage>, AppError> {
    let client_id = caller.require_client()?;
    let history = state
        .engine
        .client_history(client_id, query.page, query.limit)
        .await?;
    let (page, limit) = query.resolved();
    Ok(Json(RequestPage {
        page,
        limit,
        requests: history.into_iter().map(Into::into).collect(),
    }))
}

/// GET /v1/requests/:id: Current status of a request.
#[utoipa::path(
    get,
    path = "/v1/requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request found", body = RequestView),
        (status = 403, description = "Caller is not a party to the request", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn get_request(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestView>, AppError> {
    let snapshot = state
        .engine
        .request_status(caller.actor(), RequestId(id))
        .await?;
    Ok(Json(snapshot.into()))
}

/// POST /v1/requests/:id/accept: Claim a pending request.
#[utoipa::path(
    post,
    path = "/v1/requests/{id}/accept",
    params(("id" = Uuid, Path, description = "Request ID")),
    responses(
        (status = 200, description = "Request assigned to the caller", body = AssignmentView),
        (status = 402, description = "Balance does not cover the acceptance fee", body = crate::error::ErrorBody),
        (status = 404, description = "Request or agent not found", body = crate::error::ErrorBody),
        (status = 409, description = "Request no longer available", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn accept_request(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentView>, AppError> {
    let agent_id = caller.require_agent()?;
    let assignment = state.engine.accept_request(agent_id, RequestId(id)).await?;
    Ok(Json(assignment.into()))
}

/// POST /v1/requests/:id/complete: Finish an assigned request.
#[utoipa::path(
    post,
    path = "/v1/requests/{id}/complete",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = CompleteRequestBody,
    responses(
        (status = 200, description = "Request completed", body = CompletionView),
        (status = 403, description = "Caller is not the bound agent", body = crate::error::ErrorBody),
        (status = 409, description = "Request is not assigned", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid rating or comment", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn complete_request(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CompleteRequestBody>, JsonRejection>,
) -> Result<Json<CompletionView>, AppError> {
    let agent_id = caller.require_agent()?;
    let body = extract_json(body)?;
    let rating = Rating::new(body.rating)?;
    let record = state
        .engine
        .complete_request(agent_id, RequestId(id), rating, &body.comment)
        .await?;
    Ok(Json(record.into()))
}

/// POST /v1/requests/:id/cancel: Cancel or withdraw a request.
#[utoipa::path(
    post,
    path = "/v1/requests/{id}/cancel",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = CancelRequestBody,
    responses(
        (status = 200, description = "Request cancelled", body = CancellationView),
        (status = 403, description = "Caller may not cancel this request", body = crate::error::ErrorBody),
        (status = 409, description = "Request already completed or cancelled", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn cancel_request(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CancelRequestBody>, JsonRejection>,
) -> Result<Json<CancellationView>, AppError> {
    let body = extract_json(body)?;
    let record = state
        .engine
        .cancel_request(caller.actor(), RequestId(id), &body.reason)
        .await?;
    Ok(Json(record.into()))
}

/// POST /v1/requests/:id/rating: Rate the agent of a completed request.
#[utoipa::path(
    post,
    path = "/v1/requests/{id}/rating",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = RateAgentBody,
    responses(
        (status = 200, description = "Rating recorded", body = RatingView),
        (status = 403, description = "Caller does not own the request", body = crate::error::ErrorBody),
        (status = 409, description = "Not completed, or already rated", body = crate::error::ErrorBody),
    ),
    tag = "requests"
)]
async fn rate_agent(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RateAgentBody>, JsonRejection>,
) -> Result<Json<RatingView>, AppError> {
    let client_id = caller.require_client()?;
    let body = extract_json(body)?;
    let rating = Rating::new(body.rating)?;
    let request_id = RequestId(id);
    let recorded = state
        .engine
        .rate_agent(client_id, request_id, rating, &body.comment)
        .await?;
    Ok(Json(RatingView::new(request_id, recorded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixin_core::{AgentId, ClientId, Credits};
    use fixin_state::{CancelInitiator, ServiceRequest};

    fn snapshot(bucket: RequestBucket) -> RequestSnapshot {
        let request = ServiceRequest::new(
            ClientId::new(),
            ServiceTypeId::new(),
            GeoPoint::new(-31.4, -64.2).unwrap(),
            "flat tyre",
            Utc::now(),
        )
        .unwrap();
        RequestSnapshot { request, bucket }
    }

    #[test]
    fn pending_view_exposes_expiry_only() {
        let expires_at = Utc::now();
        let view = RequestView::from(snapshot(RequestBucket::Pending { expires_at }));
        assert_eq!(view.status, "pending");
        assert_eq!(view.expires_at, Some(expires_at));
        assert!(view.agent_id.is_none());
        assert!(view.fee.is_none());
    }

    #[test]
    fn cancelled_view_carries_refund_and_agent() {
        let agent = AgentId::new();
        let snap = snapshot(RequestBucket::Pending {
            expires_at: Utc::now(),
        });
        let request_id = snap.request.id;
        let view = RequestView::from(RequestSnapshot {
            request: snap.request,
            bucket: RequestBucket::Cancelled(CancellationRecord {
                request_id,
                initiator: CancelInitiator::Client,
                agent_id: Some(agent),
                reason: "no longer needed".into(),
                refund: Some(Credits::from_cents(500)),
                cancelled_at: Utc::now(),
            }),
        });
        assert_eq!(view.status, "cancelled");
        assert_eq!(view.agent_id, Some(agent.0));
        assert_eq!(view.refund.as_deref(), Some("5.00"));
        assert_eq!(view.cancelled_by.as_deref(), Some("client"));
    }

    #[test]
    fn serialized_view_omits_absent_fields() {
        let view = RequestView::from(snapshot(RequestBucket::Pending {
            expires_at: Utc::now(),
        }));
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("refund").is_none());
        assert!(json.get("expires_at").is_some());
    }
}
