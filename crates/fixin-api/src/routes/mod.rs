//! # API Route Modules
//!
//! - `requests`: the request lifecycle (create, status, accept, complete,
//!   cancel, rate) and the client's request history.
//! - `agents`: agent-scoped reads (pending queue, active jobs, ledger).

pub mod agents;
pub mod requests;

use serde::Deserialize;
use utoipa::IntoParams;

use fixin_dispatch::PAGE_SIZE_DEFAULT;

/// Paging parameters shared by every list endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Zero-based page number (default 0).
    pub page: Option<u32>,
    /// Items per page, 1 to 100 (default 20).
    pub limit: Option<u32>,
}

impl PageQuery {
    /// The page and limit echoed back to the caller, defaults applied.
    pub(crate) fn resolved(&self) -> (u32, u32) {
        (
            self.page.unwrap_or(0),
            self.limit.unwrap_or(PAGE_SIZE_DEFAULT),
        )
    }
}
