//! Snapshot persistence for contribution records.
//!
//! The durable store keeps every contribution in one JSON snapshot. Each
//! committed batch rewrites the snapshot atomically (see
//! [`write_atomic`](super::fsync::write_atomic)), so a reader or a restarted
//! process always sees a complete before-or-after state, never a half-applied
//! batch.

use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::fsync::write_atomic;
use crate::types::ContributionRecord;

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Persisted contribution table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionSnapshot {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// When this snapshot was written.
    pub snapshot_at: DateTime<Utc>,

    /// Number of committed batches since the store was created.
    pub commit_seq: u64,

    /// All contribution records, in key order.
    pub records: Vec<ContributionRecord>,
}

impl ContributionSnapshot {
    /// Creates a new empty snapshot.
    pub fn new() -> Self {
        ContributionSnapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            commit_seq: 0,
            records: Vec::new(),
        }
    }
}

impl Default for ContributionSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Saves a snapshot atomically to disk.
pub fn save_snapshot_atomic(path: &Path, snapshot: &ContributionSnapshot) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Loads a snapshot from disk.
///
/// # Errors
///
/// Returns an error if the file can't be read, the JSON is malformed, or the
/// schema version is incompatible.
pub fn load_snapshot(path: &Path) -> Result<ContributionSnapshot> {
    let bytes = std::fs::read(path)?;
    let snapshot: ContributionSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Attempts to load a snapshot, returning None if the file doesn't exist.
///
/// Other errors (malformed JSON, schema mismatch) are propagated.
pub fn try_load_snapshot(path: &Path) -> Result<Option<ContributionSnapshot>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
