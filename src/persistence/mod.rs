//! Persistence primitives shared by the durable store and the task spool.
//!
//! # Crash Safety
//!
//! - Snapshots are written atomically using write-to-temp-then-rename
//! - Spool state transitions are single renames
//! - Every rename, create and remove is followed by a directory fsync

pub mod fsync;
pub mod snapshot;

pub use fsync::{fsync_dir, fsync_file, remove_durable, rename_durable, write_atomic};
pub use snapshot::{
    ContributionSnapshot, SCHEMA_VERSION, SnapshotError, load_snapshot, save_snapshot_atomic,
    try_load_snapshot,
};
