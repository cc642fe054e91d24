//! Checkout cleanup between ledger attempts.
//!
//! A failed attempt can leave the checkout mid-rebase, with a local commit
//! the remote never accepted, or with staged and untracked files. The next
//! attempt starts from a forced checkout of the remote tip, but that checkout
//! refuses to run while a rebase is stopped, so the rebase is aborted first.

use std::path::Path;

use super::{GitResult, is_rebase_in_progress, run_git_sync};

/// Abort an in-progress rebase, if any.
///
/// Returns true if a rebase was stopped and has now been aborted.
pub fn abort_rebase(checkout: &Path) -> GitResult<bool> {
    if !is_rebase_in_progress(checkout)? {
        return Ok(false);
    }
    run_git_sync(checkout, &["rebase", "--abort"])?;
    Ok(true)
}

/// Discard staged changes and working-tree edits to tracked files.
///
/// On an unborn branch there is no HEAD to reset to, so the index is emptied
/// instead.
pub fn reset_hard(checkout: &Path) -> GitResult<()> {
    if super::try_rev_parse(checkout, "HEAD")?.is_some() {
        run_git_sync(checkout, &["reset", "--hard", "HEAD"])?;
    } else {
        run_git_sync(checkout, &["read-tree", "--empty"])?;
    }
    Ok(())
}

/// Remove untracked files and directories.
pub fn clean_untracked(checkout: &Path) -> GitResult<()> {
    // -f = force, -d = directories, -x = ignored files too
    run_git_sync(checkout, &["clean", "-fdx"])?;
    Ok(())
}

/// Check if a checkout has uncommitted or untracked changes.
pub fn is_dirty(checkout: &Path) -> GitResult<bool> {
    let output = run_git_sync(checkout, &["status", "--porcelain"])?;
    Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
}
