//! Core domain types for the contribution reconciler.
//!
//! This module contains the identifiers, contribution records and
//! reconciliation tasks shared by every other module.

pub mod contribution;
pub mod ids;
pub mod task;

// Re-export commonly used types at the module level
pub use contribution::{ContributionKey, ContributionRecord};
pub use ids::{CentralUserId, EventId, PageId, RevisionId, WikiId};
pub use task::{ReconcileReason, ReconciliationTask};
