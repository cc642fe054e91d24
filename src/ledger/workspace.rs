//! On-disk layout owned by one invocation.
//!
//! ```text
//! <root>/
//!   ledger.log       - local journal (every entry this workspace accepted)
//!   checkout/        - dedicated checkout of the ledger branch
//!   markers/         - local dedupe markers
//!   markers.git/     - bare scratch repository for shared marker commits
//! ```
//!
//! Tests create many workspaces side by side in temporary directories; nothing
//! here depends on the process working directory.

use std::io;
use std::path::{Path, PathBuf};

use super::entry::{LedgerEntry, contains_line};
use crate::persistence::append_synced;

/// Name of the ledger file, both in the journal directory and in the branch.
pub const LEDGER_FILE: &str = "ledger.log";

/// Paths for one invocation's local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerWorkspace {
    root: PathBuf,
}

impl LedgerWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LedgerWorkspace { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The local journal.
    pub fn journal_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    /// The dedicated checkout of the ledger branch.
    pub fn checkout_dir(&self) -> PathBuf {
        self.root.join("checkout")
    }

    /// Root of the local marker store.
    pub fn markers_dir(&self) -> PathBuf {
        self.root.join("markers")
    }

    /// Bare repository used to build shared marker commits.
    pub fn marker_scratch_dir(&self) -> PathBuf {
        self.root.join("markers.git")
    }

    /// Durably appends `entry` to the local journal.
    ///
    /// Always appends: the journal records every acceptance by this workspace,
    /// including retries of the same entry by a later invocation.
    pub fn append_to_journal(&self, entry: &LedgerEntry) -> io::Result<()> {
        append_synced(&self.journal_path(), entry.to_line().as_bytes())
    }

    /// Reads the local journal; a missing journal reads as empty.
    pub fn read_journal(&self) -> io::Result<String> {
        read_or_empty(&self.journal_path())
    }

    /// Returns true if the local journal holds `entry`'s line.
    pub fn journal_contains(&self, entry: &LedgerEntry) -> io::Result<bool> {
        Ok(contains_line(&self.read_journal()?, &entry.to_line()))
    }
}

/// Reads a file as UTF-8, treating a missing file as empty.
pub fn read_or_empty(path: &Path) -> io::Result<String> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

/// Appends `entry`'s line to the ledger file at `path` unless it is already
/// one of the file's lines. Returns true if the file was changed.
///
/// A file whose last line lacks a newline gets one first, so the entry always
/// starts on its own line.
pub fn materialize_entry(path: &Path, entry: &LedgerEntry) -> io::Result<bool> {
    let existing = read_or_empty(path)?;
    let line = entry.to_line();
    if contains_line(&existing, &line) {
        return Ok(false);
    }

    let mut bytes = String::with_capacity(line.len() + 1);
    if !existing.is_empty() && !existing.ends_with('\n') {
        bytes.push('\n');
    }
    bytes.push_str(&line);
    append_synced(path, bytes.as_bytes())?;
    Ok(true)
}
