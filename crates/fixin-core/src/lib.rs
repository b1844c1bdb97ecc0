//! # fixin-core: Foundational Types for the FixIn Dispatch Stack
//!
//! Every other crate in the workspace depends on `fixin-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `RequestId`, `AgentId`,
//!    `ClientId`, `ServiceTypeId`, `LedgerEntryId`. You cannot pass an
//!    `AgentId` where a `ClientId` is expected.
//!
//! 2. **`Credits` for balances and fees.** A non-negative decimal. Balance
//!    arithmetic goes through `checked_sub`, which refuses to go below zero.
//!
//! 3. **Validated constructors.** `GeoPoint`, `Rating` and bounded text are
//!    checked once at the edge and trusted afterwards.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `fixin-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod credits;
pub mod error;
pub mod geo;
pub mod identity;
pub mod rating;
pub mod text;

pub use credits::Credits;
pub use error::ValidationError;
pub use geo::{GeoPoint, GeoPolygon};
pub use identity::{AgentId, ClientId, LedgerEntryId, RequestId, ServiceTypeId};
pub use rating::Rating;
pub use text::bounded_text;
