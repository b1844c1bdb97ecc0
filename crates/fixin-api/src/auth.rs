//! # Caller Identity
//!
//! Bearer token middleware that resolves every request to a client or an
//! agent.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{id}:{secret}   (AUTH_TOKEN configured)
//! Bearer {role}:{id}            (development mode, no AUTH_TOKEN)
//! ```
//!
//! `role` is `client` or `agent`; `id` is the caller's UUID. In development
//! mode the identity is trusted as presented. A request without a usable
//! identity is rejected with 401 in both modes, since every operation acts
//! on behalf of a specific party.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;

use fixin_core::{AgentId, ClientId};
use fixin_state::Actor;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// The two kinds of party that call the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Agent => "agent",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(Self::Client),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, injected by [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    pub id: Uuid,
}

impl CallerIdentity {
    pub fn client(id: ClientId) -> Self {
        Self {
            role: Role::Client,
            id: id.0,
        }
    }

    pub fn agent(id: AgentId) -> Self {
        Self {
            role: Role::Agent,
            id: id.0,
        }
    }

    /// The lifecycle actor this caller acts as.
    pub fn actor(&self) -> Actor {
        match self.role {
            Role::Client => Actor::Client(ClientId(self.id)),
            Role::Agent => Actor::Agent(AgentId(self.id)),
        }
    }

    /// The caller's client id, or 403 when the caller is an agent.
    pub fn require_client(&self) -> Result<ClientId, AppError> {
        match self.role {
            Role::Client => Ok(ClientId(self.id)),
            Role::Agent => Err(forbidden_role(Role::Client, self.role)),
        }
    }

    /// The caller's agent id, or 403 when the caller is a client.
    pub fn require_agent(&self) -> Result<AgentId, AppError> {
        match self.role {
            Role::Agent => Ok(AgentId(self.id)),
            Role::Client => Err(forbidden_role(Role::Agent, self.role)),
        }
    }
}

fn forbidden_role(required: Role, actual: Role) -> AppError {
    AppError::Forbidden(format!(
        "role '{}' required, caller has '{}'",
        required.as_str(),
        actual.as_str()
    ))
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn parse_identity(role: &str, id: &str) -> Result<CallerIdentity, String> {
    let role = Role::parse(role).ok_or_else(|| format!("unknown role: {role}"))?;
    let id = id
        .parse::<Uuid>()
        .map_err(|e| format!("invalid caller id: {e}"))?;
    Ok(CallerIdentity { role, id })
}

/// Parse a bearer token against the configured secret.
///
/// With `expected_secret` set, only `{role}:{id}:{secret}` is accepted.
/// Without it, `{role}:{id}` is trusted and a trailing secret is ignored.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: Option<&str>,
) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    match (parts.as_slice(), expected_secret) {
        ([role, id, secret], Some(expected)) => {
            if !constant_time_token_eq(secret, expected) {
                return Err("invalid bearer token".into());
            }
            parse_identity(role, id)
        }
        ([role, id], None) | ([role, id, _], None) => parse_identity(role, id),
        (_, Some(_)) => Err("invalid token format, expected {role}:{id}:{secret}".into()),
        (_, None) => Err("invalid token format, expected {role}:{id}".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the Bearer token into a [`CallerIdentity`] and inject it into
/// request extensions for downstream handlers.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token.to_string(),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return unauthorized_response("missing authorization header");
        }
    };

    match parse_bearer_token(&provided, expected.as_deref()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
            unauthorized_response(&msg)
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            retryable: None,
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const CLIENT: &str = "7b0c4f4e-2a6e-4a53-9f3c-1d2a4c5e6f70";

    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move {
                    format!("{}:{}", caller.role.as_str(), caller.id)
                }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(auth) = auth {
            builder = builder.header("Authorization", auth);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_with_secret_resolves_identity() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some(&format!("Bearer client:{CLIENT}:s3cret"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("client:{CLIENT}"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some(&format!("Bearer client:{CLIENT}:nope"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid bearer token"));
    }

    #[tokio::test]
    async fn secret_required_when_configured() {
        let app = test_app(Some("s3cret".into()));
        let (status, _) = call(app, Some(&format!("Bearer agent:{CLIENT}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_header_rejected_even_in_development_mode() {
        let (status, body) = call(test_app(None), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) = call(test_app(None), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn development_mode_trusts_role_and_id() {
        let (status, body) = call(test_app(None), Some(&format!("Bearer agent:{CLIENT}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("agent:{CLIENT}"));
    }

    #[test]
    fn unknown_role_rejected() {
        let err = parse_bearer_token(&format!("admin:{CLIENT}"), None).unwrap_err();
        assert!(err.contains("unknown role"));
    }

    #[test]
    fn malformed_id_rejected() {
        let err = parse_bearer_token("client:not-a-uuid:x", Some("x")).unwrap_err();
        assert!(err.contains("invalid caller id"));
    }

    #[test]
    fn role_guards() {
        let caller = CallerIdentity::client(ClientId(Uuid::nil()));
        assert!(caller.require_client().is_ok());
        assert!(matches!(caller.require_agent(), Err(AppError::Forbidden(_))));
        assert_eq!(caller.actor(), Actor::Client(ClientId(Uuid::nil())));
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_token_eq("abc", "abc"));
        assert!(!constant_time_token_eq("abc", "abd"));
        assert!(!constant_time_token_eq("ab", "abc"));
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let debug = format!("{:?}", AuthConfig { token: Some("s3cret".into()) });
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }
}
