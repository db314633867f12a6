//! Debounced reconciliation task queue.
//!
//! Each page has at most one **pending** task. Enqueueing for a page that
//! already has one is a conditional-insert miss: the new trigger is dropped,
//! because the job re-derives ground truth no matter which trigger caused it.
//!
//! # Task States
//!
//! ```text
//!   enqueue ──► pending ──claim──► in flight ──complete──► (gone)
//!                  ▲                   │
//!                  └──── release ──────┤
//!                                      └──quarantine──► quarantined
//! ```
//!
//! - Claiming moves a task out of pending, so a trigger that arrives while the
//!   job runs creates a fresh pending task and is never lost.
//! - A page with an in-flight task is never claimed a second time, so two
//!   workers never reconcile the same page concurrently.
//! - Releasing a task whose page gained a new pending task drops the released
//!   copy; the newer one already covers it.
//! - [`TaskQueue::recover`] returns in-flight tasks left by a crash to pending.

mod memory;
mod spool;

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PageId, ReconciliationTask};

pub use memory::MemoryTaskQueue;
pub use spool::SpoolTaskQueue;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// IO error during spool operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The page has no in-flight task.
    #[error("no in-flight task for page {0}")]
    NotClaimed(PageId),

    /// The queue's internal lock was poisoned by a panicking holder.
    #[error("task queue lock poisoned")]
    Poisoned,
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Outcome of a conditional enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new pending task was created.
    Enqueued,
    /// A task for the page was already pending; the trigger was dropped.
    AlreadyPending,
}

/// A task that failed in a way retrying cannot fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantinedTask {
    pub task: ReconciliationTask,
    pub error: String,
    pub quarantined_at: DateTime<Utc>,
}

/// Durable at-least-once work queue keyed by page.
pub trait TaskQueue: Send + Sync {
    /// Inserts `task` unless a task for the same page is already pending.
    fn enqueue(&self, task: ReconciliationTask) -> Result<EnqueueOutcome>;

    /// Claims the oldest task eligible at `now` whose page is not in flight.
    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>>;

    /// Claims the pending task for `page` if it is eligible at `now`.
    fn claim(&self, page: PageId, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>>;

    /// Deletes the in-flight task for `page` after a successful run.
    fn complete(&self, page: PageId) -> Result<()>;

    /// Returns an in-flight task to pending, carrying its retry bookkeeping.
    fn release(&self, task: ReconciliationTask) -> Result<()>;

    /// Parks an in-flight task for operator attention.
    fn quarantine(&self, task: ReconciliationTask, error: &str) -> Result<()>;

    /// Returns in-flight tasks from an interrupted run to pending.
    ///
    /// Must only be called before any worker starts claiming.
    fn recover(&self) -> Result<usize>;

    /// Lists pending tasks, oldest first.
    fn pending(&self) -> Result<Vec<ReconciliationTask>>;

    /// Lists quarantined tasks by page.
    fn quarantined(&self) -> Result<Vec<QuarantinedTask>>;
}

impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    fn enqueue(&self, task: ReconciliationTask) -> Result<EnqueueOutcome> {
        (**self).enqueue(task)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>> {
        (**self).claim_next(now)
    }

    fn claim(&self, page: PageId, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>> {
        (**self).claim(page, now)
    }

    fn complete(&self, page: PageId) -> Result<()> {
        (**self).complete(page)
    }

    fn release(&self, task: ReconciliationTask) -> Result<()> {
        (**self).release(task)
    }

    fn quarantine(&self, task: ReconciliationTask, error: &str) -> Result<()> {
        (**self).quarantine(task, error)
    }

    fn recover(&self) -> Result<usize> {
        (**self).recover()
    }

    fn pending(&self) -> Result<Vec<ReconciliationTask>> {
        (**self).pending()
    }

    fn quarantined(&self) -> Result<Vec<QuarantinedTask>> {
        (**self).quarantined()
    }
}

/// Claim order: earliest eligibility first, page ID as tie-breaker.
pub(crate) fn claim_order(task: &ReconciliationTask) -> (DateTime<Utc>, PageId) {
    (task.not_before.unwrap_or(task.enqueued_at), task.page_id)
}
