//! # Dispatch Errors
//!
//! [`DispatchError`] is what callers of the engine see. Every variant except
//! `Internal` is an expected outcome and must not be retried blindly: a
//! retried lock miss could hide the fact that another agent already won.

use thiserror::Error;

use fixin_core::{Credits, ValidationError};
use fixin_state::LifecycleError;

/// Failure reported by a store, locator or transaction backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A bounded lock wait elapsed, or the backend aborted the transaction
    /// to break a deadlock or serialization conflict.
    #[error("lock wait timed out")]
    LockTimeout,

    /// Any other backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Caller-visible outcome of a failed engine operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Missing or malformed input. Rejected before any store access.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced request, agent, client or service type does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The request is not in a state that allows the operation: already
    /// claimed, withdrawn, expired, terminal, or locked past the wait bound.
    #[error("request unavailable: {0}")]
    RequestUnavailable(String),

    /// The agent's balance does not cover the acceptance fee.
    #[error("insufficient balance: {balance} available, {required} required")]
    InsufficientBalance { balance: Credits, required: Credits },

    /// The caller does not own, or is not bound to, the target request.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Store or transport failure. The in-flight transaction was rolled back.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Only internal failures may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => {
                Self::RequestUnavailable("request is busy, lock wait timed out".into())
            }
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<LifecycleError> for DispatchError {
    fn from(err: LifecycleError) -> Self {
        if err.is_authorization() {
            Self::Unauthorized(err.to_string())
        } else {
            Self::RequestUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixin_state::BucketKind;

    #[test]
    fn only_internal_is_retryable() {
        assert!(DispatchError::Internal("db down".into()).is_retryable());
        assert!(!DispatchError::RequestUnavailable("taken".into()).is_retryable());
        assert!(!DispatchError::NotFound("request".into()).is_retryable());
    }

    #[test]
    fn lock_timeout_is_a_conflict() {
        let err: DispatchError = StoreError::LockTimeout.into();
        assert!(matches!(err, DispatchError::RequestUnavailable(_)));
    }

    #[test]
    fn lifecycle_errors_split_by_kind() {
        let err: DispatchError = LifecycleError::NotOwner.into();
        assert!(matches!(err, DispatchError::Unauthorized(_)));
        let err: DispatchError = LifecycleError::AlreadyTerminal {
            actual: BucketKind::Cancelled,
        }
        .into();
        assert!(matches!(err, DispatchError::RequestUnavailable(_)));
    }
}
