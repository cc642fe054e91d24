//! Dedicated repositories owned by this process.
//!
//! The ledger is written from its own checkout, never from the repository the
//! caller is working in, so a forced checkout or hard reset can't touch the
//! caller's files. Marker commits are built in a separate bare scratch
//! repository that never has a working tree.

use std::path::{Path, PathBuf};

use super::{CommitIdentity, GitResult, run_git_stdout, run_git_sync};

/// The remote name used inside every repository this module creates.
pub const ORIGIN: &str = "origin";

fn point_origin_at(dir: &Path, remote_url: &str) -> GitResult<()> {
    let existing = run_git_sync(dir, &["remote", "get-url", ORIGIN]);
    match existing {
        Ok(output) => {
            let current = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if current != remote_url {
                run_git_sync(dir, &["remote", "set-url", ORIGIN, remote_url])?;
            }
        }
        Err(_) => {
            run_git_sync(dir, &["remote", "add", ORIGIN, remote_url])?;
        }
    }
    Ok(())
}

/// Open (creating if necessary) a non-bare checkout at `dir` whose `origin`
/// points at `remote_url`.
///
/// Idempotent: an existing checkout is reused and its `origin` URL updated.
pub fn open_checkout(dir: &Path, remote_url: &str) -> GitResult<PathBuf> {
    if !dir.join(".git").exists() {
        std::fs::create_dir_all(dir)?;
        run_git_sync(dir, &["init", "--quiet"])?;
        tracing::debug!(checkout = %dir.display(), "initialized ledger checkout");
    }
    point_origin_at(dir, remote_url)?;
    Ok(dir.to_path_buf())
}

/// Open (creating if necessary) a bare scratch repository at `dir` whose
/// `origin` points at `remote_url`.
pub fn open_scratch(dir: &Path, remote_url: &str) -> GitResult<PathBuf> {
    if !dir.join("HEAD").exists() {
        std::fs::create_dir_all(dir)?;
        run_git_sync(dir, &["init", "--bare", "--quiet"])?;
        tracing::debug!(scratch = %dir.display(), "initialized marker scratch repository");
    }
    point_origin_at(dir, remote_url)?;
    Ok(dir.to_path_buf())
}

/// Write `identity` into the repository's local config.
///
/// Idempotent. Commits created by `rebase` pick the identity up from here.
pub fn configure_identity(dir: &Path, identity: &CommitIdentity) -> GitResult<()> {
    identity.validate()?;
    run_git_sync(dir, &["config", "user.name", &identity.name])?;
    run_git_sync(dir, &["config", "user.email", &identity.email])?;
    // Ledger lines are compared byte for byte; never rewrite line endings.
    run_git_sync(dir, &["config", "core.autocrlf", "false"])?;
    Ok(())
}

/// Resolve the URL of `remote` as configured in the repository at `repo`.
pub fn remote_url(repo: &Path, remote: &str) -> GitResult<String> {
    run_git_stdout(repo, &["remote", "get-url", remote])
}
