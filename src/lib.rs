//! Contribution Reconciler - keeps event contribution records consistent with
//! the host wiki's page and revision state.
//!
//! Host life-cycle signals (delete, undelete, move, revision visibility) are
//! turned into debounced per-page tasks. A background runner re-derives each
//! page's state from the host and rewrites the stored contributions in one
//! atomic batch.

pub mod config;
pub mod host;
pub mod ingress;
pub mod invariants;
pub mod persistence;
pub mod queue;
pub mod reconcile;
pub mod runner;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
