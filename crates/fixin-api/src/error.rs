//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`DispatchError`] outcomes to HTTP status codes with a JSON body
//! carrying a machine-readable code, a message and, where it matters, a
//! `retryable` flag. Internal failures are logged and never echoed back.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use fixin_core::{Credits, ValidationError};
use fixin_dispatch::DispatchError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "CONFLICT").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Whether repeating the same call may succeed. Present on conflicts
    /// and internal failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    /// Additional context for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but may not act on the resource (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Agent balance does not cover the acceptance fee (402).
    #[error("insufficient balance: {balance} available, {required} required")]
    InsufficientBalance { balance: Credits, required: Credits },

    /// The request is not in a state that allows the operation (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::InsufficientBalance { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_BALANCE")
            }
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn retryable(&self) -> Option<bool> {
        match self {
            Self::Conflict(_) => Some(false),
            Self::Internal(_) => Some(true),
            _ => None,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientBalance { balance, required } => Some(serde_json::json!({
                "balance": balance.to_string(),
                "required": required.to_string(),
            })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                retryable: self.retryable(),
                details: self.details(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(e) => Self::Validation(e.to_string()),
            DispatchError::NotFound(what) => Self::NotFound(what),
            DispatchError::RequestUnavailable(reason) => Self::Conflict(reason),
            DispatchError::InsufficientBalance { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            DispatchError::Unauthorized(reason) => Self::Forbidden(reason),
            DispatchError::Internal(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn dispatch_errors_map_to_status_codes() {
        let cases = [
            (
                DispatchError::Validation(ValidationError::Empty { field: "details" }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (DispatchError::NotFound("request".into()), StatusCode::NOT_FOUND),
            (
                DispatchError::RequestUnavailable("taken".into()),
                StatusCode::CONFLICT,
            ),
            (
                DispatchError::InsufficientBalance {
                    balance: Credits::from_cents(100),
                    required: Credits::from_cents(500),
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                DispatchError::Unauthorized("not owner".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                DispatchError::Internal("db down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let (status, _) = AppError::from(err).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn bad_request_and_unauthorized_codes() {
        assert_eq!(
            AppError::BadRequest("x".into()).status_and_code(),
            (StatusCode::BAD_REQUEST, "BAD_REQUEST")
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status_and_code(),
            (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
        );
    }

    #[tokio::test]
    async fn internal_message_is_hidden_and_retryable() {
        let (status, body) = body_json(AppError::Internal("password=hunter2".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["retryable"], true);
        assert!(!body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("hunter2"));
    }

    #[tokio::test]
    async fn conflict_is_not_retryable() {
        let (status, body) = body_json(AppError::Conflict("already assigned".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["retryable"], false);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("already assigned"));
    }

    #[tokio::test]
    async fn insufficient_balance_carries_amounts() {
        let (_, body) = body_json(AppError::InsufficientBalance {
            balance: Credits::from_cents(250),
            required: Credits::from_cents(500),
        })
        .await;
        assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
        assert_eq!(body["error"]["details"]["balance"], "2.50");
        assert_eq!(body["error"]["details"]["required"], "5.00");
        assert!(body["error"].get("retryable").is_none());
    }
}
