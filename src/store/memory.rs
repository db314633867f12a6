//! Process-local contribution store.

use std::sync::{Mutex, MutexGuard};

use tracing::trace;

use super::{ContributionStore, ContributionTable, Result, StoreError};
use crate::types::{ContributionRecord, EventId, PageId, RevisionId};

/// A contribution store held entirely in memory.
///
/// Batches are applied under one lock after every identity has been validated,
/// so concurrent readers never observe a partially applied batch.
#[derive(Debug, Default)]
pub struct InMemoryContributionStore {
    table: Mutex<ContributionTable>,
}

impl InMemoryContributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = ContributionRecord>) -> Self {
        InMemoryContributionStore {
            table: Mutex::new(ContributionTable::from_records(records)),
        }
    }

    /// Returns every record, in key order.
    pub fn all_records(&self) -> Result<Vec<ContributionRecord>> {
        Ok(self.lock()?.records().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ContributionTable>> {
        self.table.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl ContributionStore for InMemoryContributionStore {
    fn find_by_page(&self, page: PageId) -> Result<Vec<ContributionRecord>> {
        Ok(self.lock()?.find_by_page(page))
    }

    fn find_by_page_and_revision(
        &self,
        page: PageId,
        revision: RevisionId,
    ) -> Result<Option<ContributionRecord>> {
        Ok(self.lock()?.find_by_page_and_revision(page, revision))
    }

    fn find_by_event(&self, event: EventId) -> Result<Vec<ContributionRecord>> {
        Ok(self.lock()?.find_by_event(event))
    }

    fn insert(&self, record: ContributionRecord) -> Result<()> {
        trace!(key = %record.key, "Inserting contribution");
        self.lock()?.insert(record)
    }

    fn apply_updates(&self, updates: &[ContributionRecord]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.lock()?.apply_updates(updates)?;
        trace!(count = updates.len(), "Applied contribution updates");
        Ok(())
    }
}
