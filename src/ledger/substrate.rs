//! The branch substrate seam.
//!
//! The append protocol only talks to a versioned remote through this trait.
//! [`super::git_substrate::GitBranchSubstrate`] drives a real git checkout;
//! tests also use an in-memory implementation that can inject rejections,
//! conflicts and concurrent writers.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::git::{CommitIdentity, GitError};
use crate::types::Sha;

/// Failure of a single substrate operation.
///
/// The protocol treats every substrate error as a failed attempt.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The remote could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

/// Result type for substrate operations.
pub type Result<T> = std::result::Result<T, SubstrateError>;

/// What the remote holds for the ledger branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTip {
    Present(Sha),
    Missing,
}

/// How the local branch was prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkout {
    /// Forced to the fetched remote tip.
    Tracking,
    /// The branch doesn't exist remotely; a fresh, empty-history branch was started.
    Bootstrapped,
}

/// Outcome of replaying local commits onto the latest remote tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// Local commits now sit on the remote tip (possibly dropped as already applied).
    Rebased,
    /// Replaying conflicted; the rebase was aborted.
    Conflict,
    /// The remote branch still doesn't exist; nothing to rebase onto.
    NoUpstream,
}

/// Outcome of pushing the local branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The remote already points at the local head; nothing was sent.
    UpToDate,
    /// The remote moved since the last sync.
    Rejected { details: String },
}

/// A local checkout of a remote, versioned, append-only branch.
pub trait BranchSubstrate {
    /// Directory holding the checked-out files.
    fn worktree(&self) -> &Path;

    /// Configures the committer identity. Idempotent.
    fn establish_identity(&mut self, identity: &CommitIdentity) -> Result<()>;

    /// Fetches the remote tip of `branch`.
    fn fetch(&mut self, branch: &str) -> Result<RemoteTip>;

    /// Checks out `branch` forced to the last fetched remote tip, or starts it
    /// from empty history if the remote doesn't have it. Discards local edits.
    fn checkout_or_create(&mut self, branch: &str) -> Result<Checkout>;

    /// Stages a file, given relative to [`BranchSubstrate::worktree`].
    fn stage_file(&mut self, path: &Path) -> Result<()>;

    /// Returns true if the index differs from HEAD.
    fn has_staged_changes(&mut self) -> Result<bool>;

    /// Commits the index.
    fn commit(&mut self, message: &str) -> Result<()>;

    /// Fetches `branch` again and replays local commits onto it. Never merges.
    fn rebase_onto_remote(&mut self, branch: &str) -> Result<RebaseOutcome>;

    /// Pushes the local branch without force.
    fn push(&mut self, branch: &str) -> Result<PushOutcome>;

    /// Aborts any in-progress rebase and discards local commits and staged or
    /// modified files, returning to the last fetched remote tip.
    fn reset_hard(&mut self) -> Result<()>;

    /// Removes untracked files.
    fn clean_working_tree(&mut self) -> Result<()>;
}

/// A substrate with no remote, for [`ExecutionMode::LocalOnly`] runs.
///
/// Every remote operation fails with [`SubstrateError::Unavailable`], so an
/// appender accidentally run in shared mode over it exhausts its attempts
/// instead of writing anywhere.
///
/// [`ExecutionMode::LocalOnly`]: crate::types::ExecutionMode::LocalOnly
#[derive(Debug, Clone)]
pub struct DetachedSubstrate {
    dir: PathBuf,
}

impl DetachedSubstrate {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DetachedSubstrate { dir: dir.into() }
    }

    fn unavailable<T>() -> Result<T> {
        Err(SubstrateError::Unavailable(
            "no remote configured (local-only mode)".to_string(),
        ))
    }
}

impl BranchSubstrate for DetachedSubstrate {
    fn worktree(&self) -> &Path {
        &self.dir
    }

    fn establish_identity(&mut self, _identity: &CommitIdentity) -> Result<()> {
        Ok(())
    }

    fn fetch(&mut self, _branch: &str) -> Result<RemoteTip> {
        Self::unavailable()
    }

    fn checkout_or_create(&mut self, _branch: &str) -> Result<Checkout> {
        Self::unavailable()
    }

    fn stage_file(&mut self, _path: &Path) -> Result<()> {
        Self::unavailable()
    }

    fn has_staged_changes(&mut self) -> Result<bool> {
        Self::unavailable()
    }

    fn commit(&mut self, _message: &str) -> Result<()> {
        Self::unavailable()
    }

    fn rebase_onto_remote(&mut self, _branch: &str) -> Result<RebaseOutcome> {
        Self::unavailable()
    }

    fn push(&mut self, _branch: &str) -> Result<PushOutcome> {
        Self::unavailable()
    }

    fn reset_hard(&mut self) -> Result<()> {
        Ok(())
    }

    fn clean_working_tree(&mut self) -> Result<()> {
        Ok(())
    }
}
