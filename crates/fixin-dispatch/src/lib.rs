//! # fixin-dispatch: Request Dispatch & Lifecycle Engine
//!
//! Matches client service requests to nearby agents and drives each request
//! through `Pending → Assigned → Completed | Cancelled`, guaranteeing that
//! exactly one agent is ever bound to a request even under concurrent
//! acceptance.
//!
//! ## Architecture
//!
//! [`DispatchEngine`] owns the transitions. Everything it touches is an
//! injected collaborator:
//!
//! - [`DispatchStore`] / [`DispatchTx`]: durable requests, balances and
//!   ledger, with per-request exclusive locks and bounded lock waits.
//!   [`MemoryStore`] here; PostgreSQL in `fixin-api`.
//! - [`CandidateLocator`]: eligible online agents nearest first.
//!   [`MemoryLocator`] here; PostGIS in `fixin-api`.
//! - [`FanoutChannel`]: non-blocking topic publish. [`BroadcastHub`].
//! - [`Notifier`]: best-effort push. [`LogNotifier`] here; HTTP in
//!   `fixin-push`.
//!
//! ## Guarantees
//!
//! - A request is in exactly one bucket at any instant.
//! - Agent balances change only inside Accept (fee debit) and
//!   Cancel-from-Assigned (compensating credit), each with a ledger entry in
//!   the same transaction.
//! - Fanout for a transition is published only after it commits.
//! - Notification failures never change an operation's outcome.

pub mod config;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod locator;
pub mod memory;
pub mod notify;
pub mod reaper;
pub mod store;

pub use config::{ConfigError, DispatchConfig};
pub use engine::{DispatchEngine, PAGE_SIZE_DEFAULT, PAGE_SIZE_MAX};
pub use error::{DispatchError, StoreError};
pub use fanout::{events, BroadcastHub, FanoutChannel, FanoutEvent, Topic};
pub use locator::{Candidate, CandidateLocator};
pub use memory::{MemoryLocator, MemoryStore, MemoryTx};
pub use notify::{send_detached, LogNotifier, Notifier, NotifyError, PushMessage};
pub use reaper::spawn_reaper;
pub use store::{
    AgentProfile, AgentStatus, ClientProfile, DispatchStore, DispatchTx, PendingOffer,
    ServiceType,
};
