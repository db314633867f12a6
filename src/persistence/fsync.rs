//! Durable file primitives.
//!
//! Creating, renaming or removing a file changes its directory entry. Those
//! changes only survive a power loss once the directory itself is fsynced, so
//! every helper here syncs both the file and its parent directory.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entries created, renamed or removed in it are durable.
///
/// Should only be called with directory paths.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Replaces `path` with `bytes` atomically.
///
/// Writes `<path>.tmp`, fsyncs it, renames it over `path`, then fsyncs the
/// parent directory. Readers see either the old content or the new content.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp_path)?;
        file.write_all(bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(tmp_path, path)?;

    if let Some(parent) = parent {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Renames `from` to `to` and fsyncs the directory holding `to`.
pub fn rename_durable(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)?;
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fsync_dir(parent)?;
    }
    Ok(())
}

/// Removes `path` if present and fsyncs its directory.
///
/// Returns whether a file was removed.
pub fn remove_durable(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fsync_dir(parent)?;
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
