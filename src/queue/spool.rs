//! Durable task queue backed by a spool directory.
//!
//! Each task is one JSON file whose name encodes its state:
//!
//! ```text
//! <page-id>.task.json         - pending
//! <page-id>.task.json.proc    - in flight (claimed by a worker)
//! <page-id>.task.json.failed  - quarantined
//! ```
//!
//! A pending file that no longer parses is quarantined with its parse error
//! and replaced by a resync task for the same page.
//!
//! # Crash Safety
//!
//! - Pending files are written atomically (temp file + fsync + rename + dir fsync)
//! - Claiming is a single durable rename from pending to `.proc`
//! - On recovery, a `.proc` with no pending sibling is renamed back to pending;
//!   a `.proc` with a pending sibling is removed, since the newer task covers it
//!
//! # Concurrency
//!
//! Operations are serialised by an in-process lock. A spool directory must be
//! owned by a single process.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, trace, warn};

use super::{EnqueueOutcome, QuarantinedTask, QueueError, Result, TaskQueue, claim_order};
use crate::persistence::{remove_durable, rename_durable, write_atomic};
use crate::types::{PageId, ReconcileReason, ReconciliationTask};

const PENDING_SUFFIX: &str = ".task.json";
const PROC_SUFFIX: &str = ".task.json.proc";
const FAILED_SUFFIX: &str = ".task.json.failed";

/// A task queue persisted as marker files in a directory.
#[derive(Debug)]
pub struct SpoolTaskQueue {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl SpoolTaskQueue {
    /// Opens (creating if needed) the spool at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(SpoolTaskQueue {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Returns the spool directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock.lock().map_err(|_| QueueError::Poisoned)
    }

    fn pending_path(&self, page: PageId) -> PathBuf {
        self.dir.join(format!("{}{}", page.0, PENDING_SUFFIX))
    }

    fn proc_path(&self, page: PageId) -> PathBuf {
        self.dir.join(format!("{}{}", page.0, PROC_SUFFIX))
    }

    fn failed_path(&self, page: PageId) -> PathBuf {
        self.dir.join(format!("{}{}", page.0, FAILED_SUFFIX))
    }

    /// Lists the pages that have a file with `suffix`, in page order.
    fn pages_with_suffix(&self, suffix: &str) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str()
                && let Some(page) = parse_page(name, suffix)
            {
                pages.push(page);
            }
        }
        pages.sort();
        Ok(pages)
    }

    fn write_task(path: &Path, task: &ReconciliationTask) -> Result<()> {
        let bytes = serde_json::to_vec(task)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    /// Reads the pending task for `page`.
    ///
    /// A file that fails to parse is parked in quarantine with the parse error
    /// and replaced by a [`ReconcileReason::Resync`] task, so the page still
    /// gets reconciled and later triggers collapse into a claimable task.
    fn read_pending(&self, page: PageId) -> Result<ReconciliationTask> {
        let path = self.pending_path(page);
        let bytes = std::fs::read(&path)?;
        let parse_error = match serde_json::from_slice::<ReconciliationTask>(&bytes) {
            Ok(task) => return Ok(task),
            Err(e) => e,
        };

        let task = ReconciliationTask::new(page, ReconcileReason::Resync);
        let parked = QuarantinedTask {
            task: task.clone(),
            error: format!("unreadable pending task: {parse_error}"),
            quarantined_at: Utc::now(),
        };
        write_atomic(&self.failed_path(page), &serde_json::to_vec_pretty(&parked)?)?;
        Self::write_task(&path, &task)?;
        warn!(
            page = %page,
            error = %parse_error,
            "Quarantined unreadable pending task, queued resync"
        );
        Ok(task)
    }

    /// Reads every pending task in claim order.
    fn load_pending(&self) -> Result<Vec<ReconciliationTask>> {
        let mut tasks = Vec::new();
        for page in self.pages_with_suffix(PENDING_SUFFIX)? {
            tasks.push(self.read_pending(page)?);
        }
        tasks.sort_by_key(claim_order);
        Ok(tasks)
    }

    fn claim_locked(&self, task: ReconciliationTask) -> Result<ReconciliationTask> {
        rename_durable(&self.pending_path(task.page_id), &self.proc_path(task.page_id))?;
        trace!(page = %task.page_id, "Task claimed");
        Ok(task)
    }
}

/// Parses `<page-id><suffix>` into a page ID.
fn parse_page(file_name: &str, suffix: &str) -> Option<PageId> {
    file_name
        .strip_suffix(suffix)?
        .parse::<u64>()
        .ok()
        .map(PageId)
}

impl TaskQueue for SpoolTaskQueue {
    fn enqueue(&self, task: ReconciliationTask) -> Result<EnqueueOutcome> {
        let _guard = self.guard()?;
        let path = self.pending_path(task.page_id);
        if path.exists() {
            // Parsing also repairs a corrupt entry, leaving a claimable task behind.
            self.read_pending(task.page_id)?;
            return Ok(EnqueueOutcome::AlreadyPending);
        }
        Self::write_task(&path, &task)?;
        trace!(page = %task.page_id, reason = %task.reason, "Task spooled");
        Ok(EnqueueOutcome::Enqueued)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>> {
        let _guard = self.guard()?;
        let next = self
            .load_pending()?
            .into_iter()
            .find(|t| t.is_eligible(now) && !self.proc_path(t.page_id).exists());
        match next {
            Some(task) => Ok(Some(self.claim_locked(task)?)),
            None => Ok(None),
        }
    }

    fn claim(&self, page: PageId, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>> {
        let _guard = self.guard()?;
        if !self.pending_path(page).exists() || self.proc_path(page).exists() {
            return Ok(None);
        }
        let task = self.read_pending(page)?;
        if !task.is_eligible(now) {
            return Ok(None);
        }
        Ok(Some(self.claim_locked(task)?))
    }

    fn complete(&self, page: PageId) -> Result<()> {
        let _guard = self.guard()?;
        if !remove_durable(&self.proc_path(page))? {
            return Err(QueueError::NotClaimed(page));
        }
        trace!(page = %page, "Task completed");
        Ok(())
    }

    fn release(&self, task: ReconciliationTask) -> Result<()> {
        let _guard = self.guard()?;
        let page = task.page_id;
        let proc_path = self.proc_path(page);
        if !proc_path.exists() {
            return Err(QueueError::NotClaimed(page));
        }

        let pending_path = self.pending_path(page);
        if pending_path.exists() {
            debug!(page = %page, "Released task superseded by newer trigger");
        } else {
            Self::write_task(&pending_path, &task)?;
        }
        remove_durable(&proc_path)?;
        Ok(())
    }

    fn quarantine(&self, task: ReconciliationTask, error: &str) -> Result<()> {
        let _guard = self.guard()?;
        let page = task.page_id;
        let proc_path = self.proc_path(page);
        if !proc_path.exists() {
            return Err(QueueError::NotClaimed(page));
        }

        let parked = QuarantinedTask {
            task,
            error: error.to_string(),
            quarantined_at: Utc::now(),
        };
        write_atomic(&self.failed_path(page), &serde_json::to_vec_pretty(&parked)?)?;
        remove_durable(&proc_path)?;
        Ok(())
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    fn recover(&self) -> Result<usize> {
        let _guard = self.guard()?;
        let mut recovered = 0;
        for page in self.pages_with_suffix(PROC_SUFFIX)? {
            let proc_path = self.proc_path(page);
            let pending_path = self.pending_path(page);
            if pending_path.exists() {
                remove_durable(&proc_path)?;
            } else {
                rename_durable(&proc_path, &pending_path)?;
            }
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "Recovered interrupted tasks");
        }
        Ok(recovered)
    }

    fn pending(&self) -> Result<Vec<ReconciliationTask>> {
        let _guard = self.guard()?;
        self.load_pending()
    }

    fn quarantined(&self) -> Result<Vec<QuarantinedTask>> {
        let _guard = self.guard()?;
        let mut parked = Vec::new();
        for page in self.pages_with_suffix(FAILED_SUFFIX)? {
            let bytes = std::fs::read(self.failed_path(page))?;
            parked.push(serde_json::from_slice(&bytes)?);
        }
        Ok(parked)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;
    use tempfile::tempdir;

    fn with_queue(check: impl FnOnce(&dyn TaskQueue)) {
        let dir = tempdir().unwrap();
        let queue = SpoolTaskQueue::open(dir.path()).unwrap();
        check(&queue);
    }

    #[test]
    fn duplicate_enqueue_collapses() {
        with_queue(contract::duplicate_enqueue_collapses);
    }

    #[test]
    fn claim_returns_oldest_first() {
        with_queue(contract::claim_returns_oldest_first);
    }

    #[test]
    fn trigger_during_claim_is_kept() {
        with_queue(contract::trigger_during_claim_is_kept);
    }

    #[test]
    fn release_delays_retry() {
        with_queue(contract::release_delays_retry);
    }

    #[test]
    fn release_yields_to_newer_pending() {
        with_queue(contract::release_yields_to_newer_pending);
    }

    #[test]
    fn complete_requires_claim() {
        with_queue(contract::complete_requires_claim);
    }

    #[test]
    fn quarantine_parks_task() {
        with_queue(contract::quarantine_parks_task);
    }

    #[test]
    fn recover_returns_in_flight() {
        with_queue(contract::recover_returns_in_flight);
    }

    #[test]
    fn claim_specific_page() {
        with_queue(contract::claim_specific_page);
    }

    #[test]
    fn parse_page_accepts_only_exact_suffix() {
        assert_eq!(parse_page("7.task.json", PENDING_SUFFIX), Some(PageId(7)));
        assert_eq!(parse_page("7.task.json.proc", PENDING_SUFFIX), None);
        assert_eq!(parse_page("7.task.json.proc", PROC_SUFFIX), Some(PageId(7)));
        assert_eq!(parse_page("7.task.json.tmp", PENDING_SUFFIX), None);
        assert_eq!(parse_page("x.task.json", PENDING_SUFFIX), None);
    }

    #[test]
    fn tasks_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let queue = SpoolTaskQueue::open(dir.path()).unwrap();
            queue
                .enqueue(
                    ReconciliationTask::new(PageId(7), ReconcileReason::PageMoved)
                        .with_captured_title("B"),
                )
                .unwrap();
        }

        let queue = SpoolTaskQueue::open(dir.path()).unwrap();
        let pending = queue.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].captured_title.as_deref(), Some("B"));
    }

    #[test]
    fn crash_during_job_is_recovered_on_reopen() {
        let dir = tempdir().unwrap();
        {
            let queue = SpoolTaskQueue::open(dir.path()).unwrap();
            queue
                .enqueue(ReconciliationTask::new(PageId(7), ReconcileReason::PageDeleted))
                .unwrap();
            queue.claim_next(Utc::now()).unwrap().unwrap();
            // Dropped without complete/release: simulated crash.
        }

        let queue = SpoolTaskQueue::open(dir.path()).unwrap();
        assert!(queue.pending().unwrap().is_empty());
        assert_eq!(queue.recover().unwrap(), 1);
        assert_eq!(queue.pending().unwrap()[0].page_id, PageId(7));
        assert!(!dir.path().join("7.task.json.proc").exists());
    }

    #[test]
    fn corrupt_pending_file_is_quarantined_and_page_still_claimable() {
        let dir = tempdir().unwrap();
        let queue = SpoolTaskQueue::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("3.task.json"), b"garbage").unwrap();

        let outcome = queue
            .enqueue(ReconciliationTask::new(PageId(3), ReconcileReason::PageDeleted))
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::AlreadyPending);

        let claimed = queue.claim_next(Utc::now()).unwrap().unwrap();
        assert_eq!(claimed.page_id, PageId(3));
        assert_eq!(claimed.reason, ReconcileReason::Resync);

        let parked = queue.quarantined().unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].task.page_id, PageId(3));
        assert!(parked[0].error.starts_with("unreadable pending task"));

        queue.complete(PageId(3)).unwrap();
        assert!(queue.pending().unwrap().is_empty());
    }

    #[test]
    fn corrupt_pending_file_is_repaired_when_listed() {
        let dir = tempdir().unwrap();
        let queue = SpoolTaskQueue::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("3.task.json"), b"{\"page_id\":").unwrap();
        queue
            .enqueue(ReconciliationTask::new(PageId(4), ReconcileReason::PageDeleted))
            .unwrap();

        let pages: Vec<PageId> = queue.pending().unwrap().iter().map(|t| t.page_id).collect();
        assert_eq!(pages.len(), 2);
        assert!(pages.contains(&PageId(3)));
        assert_eq!(
            queue.claim(PageId(3), Utc::now()).unwrap().unwrap().reason,
            ReconcileReason::Resync
        );
        assert_eq!(queue.quarantined().unwrap().len(), 1);
    }
}
