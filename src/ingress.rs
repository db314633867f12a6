//! Event ingress: turn host life-cycle signals into reconciliation tasks.
//!
//! Listeners never reconcile inline. Each signal becomes at most one pending
//! task per page, and the job decides what actually changed.
//!
//! | Signal | Reason |
//! |--------|--------|
//! | page deleted | `PageDeleted` |
//! | page undeleted | `PageUndeleted` |
//! | page moved | `PageMoved` (new title captured in the task) |
//! | revision visibility changed | `RevisionVisibilityChanged` |
//!
//! [`pump`] never drops a signal: a failed enqueue is retried with the
//! listener's backoff until it succeeds or shutdown is requested.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::host::{LifecycleSignal, LifecycleSignalSource};
use crate::queue::{EnqueueOutcome, Result, TaskQueue};
use crate::runner::RetryConfig;
use crate::types::{PageId, ReconcileReason, ReconciliationTask, RevisionId};

/// Converts host signals into queued tasks.
#[derive(Debug)]
pub struct IngressListener<Q> {
    queue: Q,
    wakeup: Option<Arc<Notify>>,
    retry: RetryConfig,
}

impl<Q: TaskQueue> IngressListener<Q> {
    pub fn new(queue: Q) -> Self {
        IngressListener {
            queue,
            wakeup: None,
            retry: RetryConfig::DEFAULT,
        }
    }

    /// Wakes idle runner workers whenever a new task is queued.
    pub fn with_wakeup(mut self, wakeup: Arc<Notify>) -> Self {
        self.wakeup = Some(wakeup);
        self
    }

    /// Backoff used by [`pump`] when the queue rejects a signal.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn on_page_deleted(&self, page: PageId) -> Result<EnqueueOutcome> {
        self.enqueue_reconciliation(page, ReconcileReason::PageDeleted, None)
    }

    /// The restored revision IDs are only logged; the job re-reads visibility.
    pub fn on_page_undeleted(
        &self,
        page: PageId,
        revision_ids: &[RevisionId],
    ) -> Result<EnqueueOutcome> {
        debug!(page = %page, restored = revision_ids.len(), "Page undeleted");
        self.enqueue_reconciliation(page, ReconcileReason::PageUndeleted, None)
    }

    pub fn on_page_moved(&self, page: PageId, new_prefixed_title: &str) -> Result<EnqueueOutcome> {
        self.enqueue_reconciliation(page, ReconcileReason::PageMoved, Some(new_prefixed_title))
    }

    pub fn on_revision_visibility_changed(
        &self,
        page: PageId,
        revision: RevisionId,
    ) -> Result<EnqueueOutcome> {
        debug!(page = %page, revision = %revision, "Revision visibility changed");
        self.enqueue_reconciliation(page, ReconcileReason::RevisionVisibilityChanged, None)
    }

    /// Dispatches a signal to the matching listener.
    pub fn handle(&self, signal: &LifecycleSignal) -> Result<EnqueueOutcome> {
        match signal {
            LifecycleSignal::PageDeleted { page_id } => self.on_page_deleted(*page_id),
            LifecycleSignal::PageUndeleted {
                page_id,
                revision_ids,
            } => self.on_page_undeleted(*page_id, revision_ids),
            LifecycleSignal::PageMoved {
                page_id,
                new_prefixed_title,
            } => self.on_page_moved(*page_id, new_prefixed_title),
            LifecycleSignal::RevisionVisibilityChanged {
                page_id,
                revision_id,
            } => self.on_revision_visibility_changed(*page_id, *revision_id),
        }
    }

    /// Queues a reconciliation for `page` unless one is already pending.
    ///
    /// A collapsed trigger is expected under bursts and is not an error.
    pub fn enqueue_reconciliation(
        &self,
        page: PageId,
        reason: ReconcileReason,
        captured_title: Option<&str>,
    ) -> Result<EnqueueOutcome> {
        let mut task = ReconciliationTask::new(page, reason);
        if let Some(title) = captured_title {
            task = task.with_captured_title(title);
        }

        let outcome = self.queue.enqueue(task)?;
        match outcome {
            EnqueueOutcome::Enqueued => {
                debug!(page = %page, reason = %reason, "Reconciliation queued");
                if let Some(wakeup) = &self.wakeup {
                    wakeup.notify_one();
                }
            }
            EnqueueOutcome::AlreadyPending => {
                debug!(page = %page, reason = %reason, "Reconciliation already pending, trigger collapsed");
            }
        }
        Ok(outcome)
    }
}

/// Feeds signals from `source` into `listener` until the source closes or
/// `shutdown` fires. Returns the number of signals handled.
///
/// A signal whose enqueue fails is retried with backoff and is not abandoned
/// unless shutdown interrupts the wait.
#[instrument(skip_all)]
pub async fn pump<S, Q>(
    mut source: S,
    listener: &IngressListener<Q>,
    shutdown: CancellationToken,
) -> usize
where
    S: LifecycleSignalSource,
    Q: TaskQueue,
{
    let mut handled = 0;
    loop {
        let signal = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, stopping signal pump");
                break;
            }
            signal = source.next_signal() => signal,
        };

        let Some(signal) = signal else {
            info!("Signal source closed");
            break;
        };

        if !deliver(&signal, listener, &shutdown).await {
            warn!(page = %signal.page_id(), "Shutdown requested before signal could be queued");
            break;
        }
        handled += 1;
    }
    handled
}

/// Hands one signal to the listener, backing off between failed attempts.
/// Returns `false` if shutdown fired first.
async fn deliver<Q: TaskQueue>(
    signal: &LifecycleSignal,
    listener: &IngressListener<Q>,
    shutdown: &CancellationToken,
) -> bool {
    let mut attempt = 0;
    loop {
        match listener.handle(signal) {
            Ok(_) => return true,
            Err(e) => {
                let delay = listener.retry.delay_for_attempt(attempt);
                attempt = attempt.saturating_add(1);
                warn!(
                    page = %signal.page_id(),
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Failed to queue reconciliation, retrying"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
