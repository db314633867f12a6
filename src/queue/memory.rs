//! Process-local task queue.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::{EnqueueOutcome, QuarantinedTask, QueueError, Result, TaskQueue, claim_order};
use crate::types::{PageId, ReconciliationTask};

#[derive(Debug, Default)]
struct QueueState {
    pending: BTreeMap<PageId, ReconciliationTask>,
    in_flight: HashMap<PageId, ReconciliationTask>,
    quarantined: BTreeMap<PageId, QuarantinedTask>,
}

/// A task queue held in memory. Tasks do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    state: Mutex<QueueState>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently claimed by a worker.
    pub fn in_flight_len(&self) -> Result<usize> {
        Ok(self.lock()?.in_flight.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state.lock().map_err(|_| QueueError::Poisoned)
    }
}

impl TaskQueue for MemoryTaskQueue {
    fn enqueue(&self, task: ReconciliationTask) -> Result<EnqueueOutcome> {
        let mut state = self.lock()?;
        if state.pending.contains_key(&task.page_id) {
            return Ok(EnqueueOutcome::AlreadyPending);
        }
        trace!(page = %task.page_id, reason = %task.reason, "Task enqueued");
        state.pending.insert(task.page_id, task);
        Ok(EnqueueOutcome::Enqueued)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>> {
        let mut state = self.lock()?;
        let next = state
            .pending
            .values()
            .filter(|t| t.is_eligible(now) && !state.in_flight.contains_key(&t.page_id))
            .min_by_key(|t| claim_order(t))
            .map(|t| t.page_id);

        let Some(page) = next else {
            return Ok(None);
        };
        let Some(task) = state.pending.remove(&page) else {
            return Ok(None);
        };
        state.in_flight.insert(page, task.clone());
        Ok(Some(task))
    }

    fn claim(&self, page: PageId, now: DateTime<Utc>) -> Result<Option<ReconciliationTask>> {
        let mut state = self.lock()?;
        if state.in_flight.contains_key(&page) {
            return Ok(None);
        }
        match state.pending.get(&page) {
            Some(task) if task.is_eligible(now) => {}
            _ => return Ok(None),
        }
        let Some(task) = state.pending.remove(&page) else {
            return Ok(None);
        };
        state.in_flight.insert(page, task.clone());
        Ok(Some(task))
    }

    fn complete(&self, page: PageId) -> Result<()> {
        let mut state = self.lock()?;
        state
            .in_flight
            .remove(&page)
            .map(|_| ())
            .ok_or(QueueError::NotClaimed(page))
    }

    fn release(&self, task: ReconciliationTask) -> Result<()> {
        let mut state = self.lock()?;
        let page = task.page_id;
        if state.in_flight.remove(&page).is_none() {
            return Err(QueueError::NotClaimed(page));
        }
        if state.pending.contains_key(&page) {
            debug!(page = %page, "Released task superseded by newer trigger");
            return Ok(());
        }
        state.pending.insert(page, task);
        Ok(())
    }

    fn quarantine(&self, task: ReconciliationTask, error: &str) -> Result<()> {
        let mut state = self.lock()?;
        let page = task.page_id;
        if state.in_flight.remove(&page).is_none() {
            return Err(QueueError::NotClaimed(page));
        }
        state.quarantined.insert(
            page,
            QuarantinedTask {
                task,
                error: error.to_string(),
                quarantined_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn recover(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let in_flight: Vec<_> = state.in_flight.drain().collect();
        let mut recovered = 0;
        for (page, task) in in_flight {
            if !state.pending.contains_key(&page) {
                state.pending.insert(page, task);
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    fn pending(&self) -> Result<Vec<ReconciliationTask>> {
        let state = self.lock()?;
        let mut tasks: Vec<_> = state.pending.values().cloned().collect();
        tasks.sort_by_key(claim_order);
        Ok(tasks)
    }

    fn quarantined(&self) -> Result<Vec<QuarantinedTask>> {
        Ok(self.lock()?.quarantined.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;
    use crate::test_utils::arb_reason;
    use crate::types::ReconcileReason;
    use proptest::prelude::*;

    #[test]
    fn duplicate_enqueue_collapses() {
        contract::duplicate_enqueue_collapses(&MemoryTaskQueue::new());
    }

    #[test]
    fn claim_returns_oldest_first() {
        contract::claim_returns_oldest_first(&MemoryTaskQueue::new());
    }

    #[test]
    fn trigger_during_claim_is_kept() {
        contract::trigger_during_claim_is_kept(&MemoryTaskQueue::new());
    }

    #[test]
    fn release_delays_retry() {
        contract::release_delays_retry(&MemoryTaskQueue::new());
    }

    #[test]
    fn release_yields_to_newer_pending() {
        contract::release_yields_to_newer_pending(&MemoryTaskQueue::new());
    }

    #[test]
    fn complete_requires_claim() {
        contract::complete_requires_claim(&MemoryTaskQueue::new());
    }

    #[test]
    fn quarantine_parks_task() {
        contract::quarantine_parks_task(&MemoryTaskQueue::new());
    }

    #[test]
    fn recover_returns_in_flight() {
        contract::recover_returns_in_flight(&MemoryTaskQueue::new());
    }

    #[test]
    fn claim_specific_page() {
        contract::claim_specific_page(&MemoryTaskQueue::new());
    }

    #[test]
    fn claim_tracks_in_flight() {
        let queue = MemoryTaskQueue::new();
        queue
            .enqueue(ReconciliationTask::new(PageId(1), ReconcileReason::PageDeleted))
            .unwrap();
        queue.claim_next(Utc::now()).unwrap().unwrap();
        assert_eq!(queue.in_flight_len().unwrap(), 1);
        queue.complete(PageId(1)).unwrap();
        assert_eq!(queue.in_flight_len().unwrap(), 0);
    }

    proptest! {
        /// A burst of triggers leaves exactly one pending task per distinct page.
        #[test]
        fn burst_bounded_to_one_task_per_page(
            triggers in prop::collection::vec((1u64..20, arb_reason()), 0..200),
        ) {
            let queue = MemoryTaskQueue::new();
            for (page, reason) in &triggers {
                queue.enqueue(ReconciliationTask::new(PageId(*page), *reason)).unwrap();
            }

            let mut pages: Vec<u64> = triggers.iter().map(|(p, _)| *p).collect();
            pages.sort();
            pages.dedup();

            let mut pending: Vec<u64> = queue.pending().unwrap().iter().map(|t| t.page_id.0).collect();
            pending.sort();
            prop_assert_eq!(pending, pages);
        }
    }
}
