//! Contribution record store.
//!
//! Point lookups and atomic batch updates over contribution records, keyed by
//! `(event, wiki, page, revision)`.
//!
//! # Write Rules
//!
//! - Reconciliation only ever updates existing rows. An update whose identity
//!   is missing fails with [`StoreError::NotFound`] and the whole batch is
//!   rejected.
//! - A batch is all-or-nothing: either every staged row is visible afterwards
//!   or none is.
//! - Only `page_prefixed_text` and `is_deleted` are replaced by an update. The
//!   immutable fields of the stored row win over whatever the caller passes.
//!
//! # Wiki Scope
//!
//! Page lookups match on page ID alone. A store, and the deployment around it,
//! serves one wiki: page IDs from two wikis must not share a store.
//!
//! # Implementations
//!
//! - [`InMemoryContributionStore`]: process-local, used by tests and embedders
//!   that own persistence themselves
//! - [`FileContributionStore`]: durable JSON snapshot rewritten atomically per batch

mod file;
mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::persistence::SnapshotError;
use crate::types::{ContributionKey, ContributionRecord, EventId, PageId, RevisionId};

pub use file::FileContributionStore;
pub use memory::InMemoryContributionStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An update targeted a contribution that does not exist.
    #[error("contribution not found: {0}")]
    NotFound(ContributionKey),

    /// An insert targeted a contribution that already exists.
    #[error("contribution already exists: {0}")]
    Duplicate(ContributionKey),

    /// The store is temporarily unavailable.
    #[error("store unavailable: {0}")]
    Transient(String),

    /// Snapshot persistence failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The store's lock was poisoned by a panicking holder and will not recover.
    #[error("contribution store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Returns true if retrying the same operation later may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Snapshot(SnapshotError::Io(_)) => true,
            StoreError::NotFound(_)
            | StoreError::Duplicate(_)
            | StoreError::Poisoned
            | StoreError::Snapshot(SnapshotError::Json(_))
            | StoreError::Snapshot(SnapshotError::SchemaMismatch { .. }) => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence for contribution records.
pub trait ContributionStore: Send + Sync {
    /// Returns every contribution on `page`, ordered by revision ascending.
    fn find_by_page(&self, page: PageId) -> Result<Vec<ContributionRecord>>;

    /// Returns a contribution tied to `revision` on `page`, if any.
    ///
    /// When several events share a revision, the first in key order is returned.
    fn find_by_page_and_revision(
        &self,
        page: PageId,
        revision: RevisionId,
    ) -> Result<Option<ContributionRecord>>;

    /// Returns every contribution for `event`, in key order.
    fn find_by_event(&self, event: EventId) -> Result<Vec<ContributionRecord>>;

    /// Adds a new contribution. Fails with `Duplicate` if the identity exists.
    fn insert(&self, record: ContributionRecord) -> Result<()>;

    /// Replaces the mutable fields of every record in `updates` atomically.
    fn apply_updates(&self, updates: &[ContributionRecord]) -> Result<()>;

    /// Replaces the mutable fields of a single record.
    fn apply_update(&self, record: &ContributionRecord) -> Result<()> {
        self.apply_updates(std::slice::from_ref(record))
    }
}

impl<T: ContributionStore + ?Sized> ContributionStore for Arc<T> {
    fn find_by_page(&self, page: PageId) -> Result<Vec<ContributionRecord>> {
        (**self).find_by_page(page)
    }

    fn find_by_page_and_revision(
        &self,
        page: PageId,
        revision: RevisionId,
    ) -> Result<Option<ContributionRecord>> {
        (**self).find_by_page_and_revision(page, revision)
    }

    fn find_by_event(&self, event: EventId) -> Result<Vec<ContributionRecord>> {
        (**self).find_by_event(event)
    }

    fn insert(&self, record: ContributionRecord) -> Result<()> {
        (**self).insert(record)
    }

    fn apply_updates(&self, updates: &[ContributionRecord]) -> Result<()> {
        (**self).apply_updates(updates)
    }
}

/// The smallest key on `page` at or after `revision`.
fn lower_bound(page: PageId, revision: RevisionId) -> ContributionKey {
    ContributionKey::new(EventId(0), "", page, revision)
}

/// The ordered contribution table shared by both store implementations.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContributionTable {
    rows: BTreeMap<ContributionKey, ContributionRecord>,
}

impl ContributionTable {
    pub(crate) fn from_records(records: impl IntoIterator<Item = ContributionRecord>) -> Self {
        ContributionTable {
            rows: records.into_iter().map(|r| (r.key.clone(), r)).collect(),
        }
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &ContributionRecord> {
        self.rows.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn find_by_page(&self, page: PageId) -> Vec<ContributionRecord> {
        // Keys order page first, so the page's rows are contiguous and already
        // sorted by revision.
        self.rows
            .range(lower_bound(page, RevisionId(0))..)
            .map(|(_, r)| r)
            .take_while(|r| r.key.page_id == page)
            .cloned()
            .collect()
    }

    pub(crate) fn find_by_page_and_revision(
        &self,
        page: PageId,
        revision: RevisionId,
    ) -> Option<ContributionRecord> {
        self.rows
            .range(lower_bound(page, revision)..)
            .map(|(_, r)| r)
            .next()
            .filter(|r| r.key.page_id == page && r.key.revision_id == revision)
            .cloned()
    }

    pub(crate) fn find_by_event(&self, event: EventId) -> Vec<ContributionRecord> {
        self.rows
            .values()
            .filter(|r| r.key.event_id == event)
            .cloned()
            .collect()
    }

    pub(crate) fn insert(&mut self, record: ContributionRecord) -> Result<()> {
        if self.rows.contains_key(&record.key) {
            return Err(StoreError::Duplicate(record.key));
        }
        self.rows.insert(record.key.clone(), record);
        Ok(())
    }

    /// Validates every identity before touching any row.
    pub(crate) fn apply_updates(&mut self, updates: &[ContributionRecord]) -> Result<()> {
        if let Some(missing) = updates.iter().find(|u| !self.rows.contains_key(&u.key)) {
            return Err(StoreError::NotFound(missing.key.clone()));
        }

        for update in updates {
            if let Some(row) = self.rows.get_mut(&update.key) {
                row.page_prefixed_text.clone_from(&update.page_prefixed_text);
                row.is_deleted = update.is_deleted;
            }
        }
        Ok(())
    }
}
