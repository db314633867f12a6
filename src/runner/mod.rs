//! Background execution of reconciliation tasks.
//!
//! A [`ReconciliationRunner`] owns one queue and one job and drives them with
//! a pool of tokio workers.
//!
//! # Task Outcomes
//!
//! | Job result | Queue action |
//! |------------|--------------|
//! | success | `complete` |
//! | retriable error (host query, store outage) | `release` with backoff |
//! | hard error (missing row, corrupt snapshot) | `quarantine` |
//!
//! # Worker Loop
//!
//! Each worker claims the oldest eligible task and runs the job on the blocking
//! pool, since store and host readers are synchronous. With nothing to claim it
//! waits for the wakeup [`Notify`] or the idle poll interval, whichever comes
//! first. Shutdown is checked between tasks, so a task that has started always
//! finishes. A task that never settles (the job panicked, or the queue refused
//! the settling call) is released with backoff so its page does not stay in
//! flight.

mod config;
mod retry;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::host::{PageStateReader, RevisionVisibilityReader};
use crate::queue::{QueueError, TaskQueue};
use crate::reconcile::{ReconcileOutcome, ReconciliationJob};
use crate::store::ContributionStore;
use crate::types::{PageId, ReconciliationTask};

pub use config::RunnerConfig;
pub use retry::RetryConfig;

/// What happened to a task after one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The job succeeded and the task was deleted.
    Completed(ReconcileOutcome),

    /// The job hit a retriable error; the task is pending again.
    Retrying {
        page: PageId,
        attempts: u32,
        not_before: DateTime<Utc>,
    },

    /// The job hit an error retrying cannot fix; the task was parked.
    Quarantined { page: PageId, error: String },
}

/// Runs queued tasks through the reconciliation job.
#[derive(Debug)]
pub struct ReconciliationRunner<Q, S, P, R> {
    queue: Q,
    job: ReconciliationJob<S, P, R>,
    config: RunnerConfig,
    wakeup: Arc<Notify>,
}

impl<Q, S, P, R> ReconciliationRunner<Q, S, P, R>
where
    Q: TaskQueue + 'static,
    S: ContributionStore + 'static,
    P: PageStateReader + 'static,
    R: RevisionVisibilityReader + 'static,
{
    pub fn new(queue: Q, job: ReconciliationJob<S, P, R>, config: RunnerConfig) -> Self {
        ReconciliationRunner {
            queue,
            job,
            config,
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn job(&self) -> &ReconciliationJob<S, P, R> {
        &self.job
    }

    /// Handle for waking idle workers; pass it to
    /// [`IngressListener::with_wakeup`](crate::ingress::IngressListener::with_wakeup).
    pub fn wakeup(&self) -> Arc<Notify> {
        Arc::clone(&self.wakeup)
    }

    /// Wakes one idle worker.
    pub fn notify(&self) {
        self.wakeup.notify_one();
    }

    /// Runs the job for an already claimed task and settles it in the queue.
    ///
    /// Only queue failures are returned; job failures become a
    /// [`TaskOutcome`].
    #[instrument(skip(self, task), fields(page = %task.page_id, reason = %task.reason, attempts = task.attempts))]
    pub fn run_task(&self, task: ReconciliationTask) -> Result<TaskOutcome, QueueError> {
        match self
            .job
            .run_reconciliation(task.page_id, task.captured_title.as_deref())
        {
            Ok(outcome) => {
                self.queue.complete(task.page_id)?;
                Ok(TaskOutcome::Completed(outcome))
            }
            Err(e) if e.is_retriable() => {
                let not_before = self
                    .config
                    .retry
                    .next_attempt_at(task.attempts, Utc::now());
                let retried = task.retried_at(not_before);
                warn!(
                    error = %e,
                    attempts = retried.attempts,
                    not_before = %not_before,
                    "Reconciliation failed, will retry"
                );
                let outcome = TaskOutcome::Retrying {
                    page: retried.page_id,
                    attempts: retried.attempts,
                    not_before,
                };
                self.queue.release(retried)?;
                Ok(outcome)
            }
            Err(e) => {
                let page = task.page_id;
                let message = e.to_string();
                error!(error = %message, "Reconciliation failed permanently, quarantining task");
                self.queue.quarantine(task, &message)?;
                Ok(TaskOutcome::Quarantined {
                    page,
                    error: message,
                })
            }
        }
    }

    /// Runs every task eligible at `now` on the calling thread.
    ///
    /// Each page is attempted at most once, so a task released with no
    /// backoff does not loop.
    pub fn drain(&self, now: DateTime<Utc>) -> Result<Vec<TaskOutcome>, QueueError> {
        let pages: Vec<PageId> = self
            .queue
            .pending()?
            .into_iter()
            .filter(|t| t.is_eligible(now))
            .map(|t| t.page_id)
            .collect();

        let mut outcomes = Vec::with_capacity(pages.len());
        for page in pages {
            if let Some(task) = self.queue.claim(page, now)? {
                outcomes.push(self.run_task(task)?);
            }
        }
        Ok(outcomes)
    }

    /// Runs the worker pool until `shutdown` fires.
    ///
    /// Call [`TaskQueue::recover`] before this so that tasks interrupted by a
    /// previous crash are picked up.
    #[instrument(skip_all, fields(workers = self.config.workers))]
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("Reconciliation runner started");

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers.max(1) {
            workers.spawn(Arc::clone(&self).worker_loop(id, shutdown.clone()));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Runner worker exited abnormally");
            }
        }

        info!("Reconciliation runner stopped");
    }

    /// Returns a claimed task that never settled to pending with backoff.
    fn release_unsettled(&self, task: ReconciliationTask) {
        let page = task.page_id;
        let not_before = self
            .config
            .retry
            .next_attempt_at(task.attempts, Utc::now());
        match self.queue.release(task.retried_at(not_before)) {
            Ok(()) => warn!(page = %page, not_before = %not_before, "Unsettled task released for retry"),
            // Settled after all, before the failing call.
            Err(QueueError::NotClaimed(_)) => {
                debug!(page = %page, "Unsettled task no longer in flight")
            }
            Err(e) => error!(page = %page, error = %e, "Failed to release unsettled task"),
        }
    }

    async fn worker_loop(self: Arc<Self>, id: usize, shutdown: CancellationToken) {
        debug!(worker = id, "Worker started");

        while !shutdown.is_cancelled() {
            match self.queue.claim_next(Utc::now()) {
                Ok(Some(task)) => {
                    let page = task.page_id;
                    let unsettled = task.clone();
                    let runner = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || runner.run_task(task)).await {
                        Ok(Ok(outcome)) => debug!(worker = id, ?outcome, "Task settled"),
                        Ok(Err(e)) => {
                            error!(worker = id, page = %page, error = %e, "Failed to settle task");
                            self.release_unsettled(unsettled);
                        }
                        Err(e) => {
                            error!(worker = id, page = %page, error = %e, "Task panicked");
                            self.release_unsettled(unsettled);
                        }
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!(worker = id, error = %e, "Failed to claim task"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wakeup.notified() => {}
                _ = tokio::time::sleep(self.config.idle_poll_interval) => {}
            }
        }

        debug!(worker = id, "Worker stopped");
    }
}
