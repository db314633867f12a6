//! Durable contribution store backed by an atomically rewritten JSON snapshot.
//!
//! # Commit Sequence
//!
//! 1. Stage the change on a copy of the in-memory table
//! 2. Write the staged table to `<path>.tmp`, fsync, rename over `<path>`, fsync dir
//! 3. Swap the staged table in
//!
//! A failure at step 1 or 2 leaves both the file and the in-memory view
//! unchanged, which is what makes a batch all-or-nothing.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, instrument};

use super::{ContributionStore, ContributionTable, Result, StoreError};
use crate::persistence::{ContributionSnapshot, SCHEMA_VERSION, save_snapshot_atomic, try_load_snapshot};
use crate::types::{ContributionRecord, EventId, PageId, RevisionId};

#[derive(Debug)]
struct FileState {
    table: ContributionTable,
    commit_seq: u64,
}

/// A contribution store persisted to a single snapshot file.
#[derive(Debug)]
pub struct FileContributionStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileContributionStore {
    /// Opens the store at `path`, creating an empty one if the file is absent.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = match try_load_snapshot(&path)? {
            Some(snapshot) => {
                info!(
                    records = snapshot.records.len(),
                    commit_seq = snapshot.commit_seq,
                    "Loaded contribution snapshot"
                );
                FileState {
                    table: ContributionTable::from_records(snapshot.records),
                    commit_seq: snapshot.commit_seq,
                }
            }
            None => {
                debug!("No contribution snapshot found, starting empty");
                FileState {
                    table: ContributionTable::default(),
                    commit_seq: 0,
                }
            }
        };

        Ok(FileContributionStore {
            path,
            state: Mutex::new(state),
        })
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of batches committed since the store was created.
    pub fn commit_seq(&self) -> Result<u64> {
        Ok(self.lock()?.commit_seq)
    }

    fn lock(&self) -> Result<MutexGuard<'_, FileState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Stages a change, persists it, and only then makes it visible.
    fn commit<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut ContributionTable) -> Result<()>,
    {
        let mut state = self.lock()?;

        let mut staged = state.table.clone();
        change(&mut staged)?;

        let commit_seq = state.commit_seq + 1;
        let snapshot = ContributionSnapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            commit_seq,
            records: staged.records().cloned().collect(),
        };
        save_snapshot_atomic(&self.path, &snapshot)?;

        state.table = staged;
        state.commit_seq = commit_seq;
        debug!(commit_seq, "Committed contribution snapshot");
        Ok(())
    }
}

impl ContributionStore for FileContributionStore {
    fn find_by_page(&self, page: PageId) -> Result<Vec<ContributionRecord>> {
        Ok(self.lock()?.table.find_by_page(page))
    }

    fn find_by_page_and_revision(
        &self,
        page: PageId,
        revision: RevisionId,
    ) -> Result<Option<ContributionRecord>> {
        Ok(self.lock()?.table.find_by_page_and_revision(page, revision))
    }

    fn find_by_event(&self, event: EventId) -> Result<Vec<ContributionRecord>> {
        Ok(self.lock()?.table.find_by_event(event))
    }

    fn insert(&self, record: ContributionRecord) -> Result<()> {
        self.commit(|table| table.insert(record))
    }

    fn apply_updates(&self, updates: &[ContributionRecord]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.commit(|table| table.apply_updates(updates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_record;
    use tempfile::tempdir;

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contributions.json");

        {
            let store = FileContributionStore::open(&path).unwrap();
            store.insert(make_record(1, 7, 100, "A")).unwrap();
            store
                .apply_update(&make_record(1, 7, 100, "A").with_reconciled("B", true))
                .unwrap();
            assert_eq!(store.commit_seq().unwrap(), 2);
        }

        let reopened = FileContributionStore::open(&path).unwrap();
        let found = reopened
            .find_by_page_and_revision(PageId(7), RevisionId(100))
            .unwrap()
            .unwrap();
        assert_eq!(found.page_prefixed_text, "B");
        assert!(found.is_deleted);
        assert_eq!(reopened.commit_seq().unwrap(), 2);
    }

    #[test]
    fn rejected_batch_does_not_touch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contributions.json");
        let store = FileContributionStore::open(&path).unwrap();
        store.insert(make_record(1, 7, 100, "A")).unwrap();
        let bytes_before = std::fs::read(&path).unwrap();

        let batch = [
            make_record(1, 7, 100, "A").with_reconciled("B", true),
            make_record(1, 7, 999, "A"),
        ];
        assert!(matches!(
            store.apply_updates(&batch),
            Err(StoreError::NotFound(_))
        ));

        assert_eq!(std::fs::read(&path).unwrap(), bytes_before);
        assert_eq!(store.commit_seq().unwrap(), 1);
    }

    #[test]
    fn failed_write_keeps_previous_view() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let path = data_dir.join("contributions.json");
        let store = FileContributionStore::open(&path).unwrap();
        store.insert(make_record(1, 7, 100, "A")).unwrap();

        // Replace the data directory with a plain file so the next write fails.
        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::write(&data_dir, b"not a directory").unwrap();

        let result = store.apply_update(&make_record(1, 7, 100, "A").with_reconciled("B", true));
        assert!(matches!(&result, Err(e) if e.is_retriable()));

        let row = store
            .find_by_page_and_revision(PageId(7), RevisionId(100))
            .unwrap()
            .unwrap();
        assert_eq!(row.page_prefixed_text, "A");
        assert!(!row.is_deleted);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FileContributionStore::open(dir.path().join("c.json")).unwrap();
        store.insert(make_record(1, 7, 100, "A")).unwrap();
        assert!(matches!(
            store.insert(make_record(1, 7, 100, "A")),
            Err(StoreError::Duplicate(_))
        ));
    }
}
