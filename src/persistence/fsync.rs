//! Low-level durable file operations.
//!
//! Both file and directory fsyncs are required for crash safety: creating a
//! file updates its parent directory entry, and without syncing the directory
//! that entry may not survive a power loss even though the contents did.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entries created or removed in it are durable.
///
/// # Errors
///
/// Returns an error if the path doesn't exist or if the fsync system call fails.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Outcome of [`create_new_synced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call created the file.
    Created,
    /// A file already existed at the path; it was left untouched.
    AlreadyExists,
}

/// Creates `path` with `contents` only if nothing exists there yet.
///
/// Uses `O_CREAT | O_EXCL` semantics, so of several processes racing on the
/// same path exactly one observes [`CreateOutcome::Created`]. Parent
/// directories are created as needed. The file and its directory are fsynced
/// before returning.
pub fn create_new_synced(path: &Path, contents: &[u8]) -> io::Result<CreateOutcome> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(e) => return Err(e),
    };
    file.write_all(contents)?;
    fsync_file(&file)?;
    fsync_dir(parent)?;

    Ok(CreateOutcome::Created)
}

/// Appends `contents` to `path`, creating the file if needed, and fsyncs it.
///
/// The directory is fsynced as well when the file did not exist before, so a
/// freshly created journal survives a crash.
pub fn append_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let existed = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(contents)?;
    fsync_file(&file)?;

    if !existed {
        fsync_dir(parent)?;
    }

    Ok(())
}
