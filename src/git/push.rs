//! Push operations against the shared remote.
//!
//! The remote's refusal to move a ref that changed underneath us is the only
//! synchronization primitive: a rejected push is reported as a value, never as
//! an error, so callers can retry.

use std::path::Path;

use crate::types::Sha;

use super::{GitError, GitResult, rev_parse};

/// Result of a push operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    /// Push succeeded.
    Success {
        /// The SHA that was pushed.
        pushed_sha: Sha,
    },

    /// Push was rejected (non-fast-forward, or the ref was created concurrently).
    Rejected {
        /// Details about why the push was rejected.
        details: String,
    },

    /// Push was a no-op (remote already has this commit).
    AlreadyUpToDate,
}

#[cfg(test)]
impl PushResult {
    /// Returns true if the remote now points at what we pushed.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            PushResult::Success { .. } | PushResult::AlreadyUpToDate
        )
    }

    /// Returns true if the push was rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, PushResult::Rejected { .. })
    }
}

fn is_rejection(stderr: &str) -> bool {
    stderr.contains("non-fast-forward")
        || stderr.contains("rejected")
        || stderr.contains("failed to push")
        || stderr.contains("already exists")
        || stderr.contains("fetch first")
}

/// Push `source` (any revision) to `dest_ref` on `remote`.
///
/// Never forces. If `dest_ref` already exists and `source` does not descend
/// from it, or if another writer updated it between our view and the push, the
/// remote refuses and [`PushResult::Rejected`] is returned.
pub fn push_ref(workdir: &Path, remote: &str, source: &str, dest_ref: &str) -> GitResult<PushResult> {
    let source_sha = rev_parse(workdir, source)?;
    let refspec = format!("{}:{}", source_sha, dest_ref);

    let output = super::git_command(workdir)
        .args(["push", remote, &refspec])
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        if stdout.contains("Everything up-to-date") || stderr.contains("Everything up-to-date") {
            return Ok(PushResult::AlreadyUpToDate);
        }
        return Ok(PushResult::Success {
            pushed_sha: source_sha,
        });
    }

    if is_rejection(&stderr) {
        return Ok(PushResult::Rejected {
            details: stderr.trim().to_string(),
        });
    }

    Err(GitError::CommandFailed {
        command: format!("git push {} {}", remote, refspec),
        stderr: stderr.to_string(),
    })
}

/// Push the current HEAD to `refs/heads/<branch>` on `remote`.
pub fn push_head_to_branch(workdir: &Path, remote: &str, branch: &str) -> GitResult<PushResult> {
    push_ref(workdir, remote, "HEAD", &format!("refs/heads/{}", branch))
}
