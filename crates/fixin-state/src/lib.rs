//! # fixin-state: Request Lifecycle State Machine
//!
//! A service request lives in exactly one bucket at a time:
//!
//! ```text
//! Pending ──▶ Assigned ──▶ Completed
//!    │            │
//!    │            └──────▶ Cancelled
//!    └───────────────────▶ Cancelled
//! ```
//!
//! `Completed` and `Cancelled` are terminal. No transition revisits a prior
//! bucket.
//!
//! ## Design
//!
//! The bucket is a tagged union ([`RequestBucket`]) whose variants carry the
//! record created on entry: the expiry deadline for `Pending`, the
//! [`Assignment`] for `Assigned`, and the terminal [`CompletionRecord`] or
//! [`CancellationRecord`]. Guarded transitions live on [`RequestSnapshot`]
//! and are pure: they check the current bucket and the acting party, and
//! return the record for the next bucket without mutating anything. Storage
//! backends apply the record inside the transaction that holds the request
//! lock.
//!
//! This crate performs no I/O.

pub mod lifecycle;
pub mod records;

pub use lifecycle::{Actor, BucketKind, LifecycleError, RequestBucket, RequestSnapshot};
pub use records::{
    AgentRating, Assignment, CancelInitiator, CancellationRecord, CompletionRecord, LedgerEntry,
    LedgerReason, ServiceRequest, DETAILS_MAX_CHARS, REASON_MAX_CHARS,
};
