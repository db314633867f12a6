//! Reconciliation tasks: per-page units of pending work.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PageId;

/// Why a page was queued for reconciliation.
///
/// Advisory only: the job re-derives state from the host regardless of reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileReason {
    PageDeleted,
    PageUndeleted,
    PageMoved,
    RevisionVisibilityChanged,
    /// Re-derive a page whose queued trigger could not be read back.
    Resync,
}

impl ReconcileReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileReason::PageDeleted => "page_deleted",
            ReconcileReason::PageUndeleted => "page_undeleted",
            ReconcileReason::PageMoved => "page_moved",
            ReconcileReason::RevisionVisibilityChanged => "revision_visibility_changed",
            ReconcileReason::Resync => "resync",
        }
    }
}

impl fmt::Display for ReconcileReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending request to reconcile all contributions of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTask {
    pub page_id: PageId,
    pub reason: ReconcileReason,
    pub enqueued_at: DateTime<Utc>,

    /// New title captured from a move signal at enqueue time.
    ///
    /// Used only when the host cannot report a current title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_title: Option<String>,

    /// Number of failed runs so far.
    #[serde(default)]
    pub attempts: u32,

    /// Earliest time the task may be claimed again after a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

impl ReconciliationTask {
    pub fn new(page_id: PageId, reason: ReconcileReason) -> Self {
        ReconciliationTask {
            page_id,
            reason,
            enqueued_at: Utc::now(),
            captured_title: None,
            attempts: 0,
            not_before: None,
        }
    }

    pub fn with_captured_title(mut self, title: impl Into<String>) -> Self {
        self.captured_title = Some(title.into());
        self
    }

    pub fn with_enqueued_at(mut self, at: DateTime<Utc>) -> Self {
        self.enqueued_at = at;
        self
    }

    /// True if the task may be claimed at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|t| t <= now)
    }

    /// Returns the task rescheduled after one more failed attempt.
    pub fn retried_at(&self, not_before: DateTime<Utc>) -> Self {
        ReconciliationTask {
            attempts: self.attempts + 1,
            not_before: Some(not_before),
            ..self.clone()
        }
    }
}
