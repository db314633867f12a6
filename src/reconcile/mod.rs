//! Reconciliation: re-derive one page's contribution state from the host.
//!
//! The job never trusts what a trigger said happened. It reads the page and
//! each tracked revision as they are *now* and rewrites the stored rows to
//! match, so replays, reorderings and collapsed triggers all converge on the
//! same result.
//!
//! # Pass Structure
//!
//! ```text
//! find_by_page ──► (empty? done) ──► page_state ──► revision visibility
//!                                                        │
//!                     apply_updates (one batch) ◄── plan_updates
//! ```
//!
//! Every host query happens before the single write, so a host failure aborts
//! the pass with nothing committed.

mod job;
mod plan;

use thiserror::Error;

use crate::host::HostQueryError;
use crate::store::StoreError;

pub use job::{ReconcileOutcome, ReconciliationJob};
pub use plan::{DesiredPageState, plan_updates};

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Host(#[from] HostQueryError),
}

impl ReconcileError {
    /// Returns true if rerunning the pass later may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_retriable(),
            ReconcileError::Host(_) => true,
        }
    }
}

/// Result type for reconciliation.
pub type Result<T> = std::result::Result<T, ReconcileError>;
