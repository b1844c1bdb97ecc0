//! # fixin-api: HTTP Service for the FixIn Dispatch Engine
//!
//! Exposes the request lifecycle over HTTP, persists it in PostgreSQL
//! (with PostGIS candidate lookup) when a database is configured, and runs
//! on the in-memory store otherwise.
//!
//! ## API Surface
//!
//! | Route                              | Module                 | Caller  |
//! |------------------------------------|------------------------|---------|
//! | `POST /v1/requests`                | [`routes::requests`]   | client  |
//! | `GET /v1/requests`                 | [`routes::requests`]   | client  |
//! | `GET /v1/requests/:id`             | [`routes::requests`]   | either  |
//! | `POST /v1/requests/:id/accept`     | [`routes::requests`]   | agent   |
//! | `POST /v1/requests/:id/complete`   | [`routes::requests`]   | agent   |
//! | `POST /v1/requests/:id/cancel`     | [`routes::requests`]   | either  |
//! | `POST /v1/requests/:id/rating`     | [`routes::requests`]   | client  |
//! | `GET /v1/agents/me/pending`        | [`routes::agents`]     | agent   |
//! | `GET /v1/agents/me/active`         | [`routes::agents`]     | agent   |
//! | `GET /v1/agents/me/ledger`         | [`routes::agents`]     | agent   |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes, `/metrics` and `/openapi.json` are mounted outside the
/// auth middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    let api = Router::new()
        .merge(routes::requests::router())
        .merge(routes::agents::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .layer(Extension(metrics.clone()))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .route("/metrics", axum::routing::get(prometheus_metrics))
        .merge(openapi::router())
        .layer(Extension(metrics))
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics: Prometheus scrape endpoint.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    metrics
        .fanout_topics()
        .set(i64::try_from(state.hub.topic_count()).unwrap_or(i64::MAX));

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 200 "ready" when the store answers, 503 otherwise.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.engine.store().ping().await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(e) => {
            tracing::warn!("Store health check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "store unreachable").into_response()
        }
    }
}
