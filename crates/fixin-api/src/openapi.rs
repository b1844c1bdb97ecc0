//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented routes into one document served at
//! `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`{role}:{id}:{secret}` where role is `client` or `agent`. \
                             The secret is omitted when AUTH_TOKEN is unset.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "FixIn Dispatch API",
        version = "0.3.0",
        description = "Request dispatch and lifecycle engine for FixIn.\n\nClients submit service requests; nearby online agents are notified and the first to accept pays the acceptance fee and is bound to the request. Requests move Pending → Assigned → Completed, or to Cancelled from either open state.\n\nAll `/v1/*` endpoints require `Authorization: Bearer <token>`. Health probes and `/metrics` are unauthenticated."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        crate::routes::requests::create_request,
        crate::routes::requests::list_requests,
        crate::routes::requests::get_request,
        crate::routes::requests::accept_request,
        crate::routes::requests::complete_request,
        crate::routes::requests::cancel_request,
        crate::routes::requests::rate_agent,
        crate::routes::agents::pending_queue,
        crate::routes::agents::active_jobs,
        crate::routes::agents::ledger_history,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::requests::CreateRequestBody,
        crate::routes::requests::CompleteRequestBody,
        crate::routes::requests::CancelRequestBody,
        crate::routes::requests::RateAgentBody,
        crate::routes::requests::CreatedRequest,
        crate::routes::requests::RequestView,
        crate::routes::requests::RequestPage,
        crate::routes::requests::AssignmentView,
        crate::routes::requests::CompletionView,
        crate::routes::requests::CancellationView,
        crate::routes::requests::RatingView,
        crate::routes::agents::PendingOfferView,
        crate::routes::agents::PendingPage,
        crate::routes::agents::LedgerEntryView,
        crate::routes::agents::LedgerPage,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "requests", description = "Service request lifecycle"),
        (name = "agents", description = "Agent account views"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_lifecycle_path() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "FixIn Dispatch API");
        for path in [
            "/v1/requests",
            "/v1/requests/{id}",
            "/v1/requests/{id}/accept",
            "/v1/requests/{id}/complete",
            "/v1/requests/{id}/cancel",
            "/v1/requests/{id}/rating",
            "/v1/agents/me/pending",
            "/v1/agents/me/active",
            "/v1/agents/me/ledger",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn request_collection_documents_both_methods() {
        let spec = ApiDoc::openapi();
        let item = &spec.paths.paths["/v1/requests"];
        let json = serde_json::to_value(item).unwrap();
        assert!(json.get("get").is_some());
        assert!(json.get("post").is_some());
    }

    #[test]
    fn spec_serializes_with_security_scheme() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert!(json["components"]["securitySchemes"]["bearer_auth"].is_object());
    }
}
