//! # Validation Errors
//!
//! Malformed input is rejected before it reaches any store. Each variant
//! names the offending field so the HTTP layer can report it verbatim.

use thiserror::Error;

/// Input validation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required text field was empty or whitespace.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name as seen by the caller.
        field: &'static str,
    },

    /// A text field exceeded its maximum length.
    #[error("{field} must not exceed {max} characters")]
    TooLong {
        /// Field name as seen by the caller.
        field: &'static str,
        /// Maximum permitted length in characters.
        max: usize,
    },

    /// A numeric field fell outside its permitted range.
    #[error("{field} out of range: {value}")]
    OutOfRange {
        /// Field name as seen by the caller.
        field: &'static str,
        /// The rejected value, rendered for display.
        value: String,
    },

    /// A credit amount was negative.
    #[error("credit amount must not be negative: {0}")]
    NegativeAmount(String),

    /// The caller's profile lacks data required before submitting work.
    #[error("{0} profile is incomplete")]
    ProfileIncomplete(&'static str),
}
