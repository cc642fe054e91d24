//! Local git plumbing used by the shared substrates.
//!
//! Both shared substrates live in an ordinary git remote:
//! - the ledger branch (`refs/heads/<branch>`) holding `ledger.log`
//! - dedupe markers as refs under `refs/webhook-markers/`
//!
//! Every command runs through [`git_command`], which isolates git from system
//! and user configuration and disables prompts, so behavior is identical on
//! developer machines and CI runners.

pub mod checkout;
pub mod push;
pub mod recovery;

use std::path::Path;
use std::process::Output;

use thiserror::Error;

use crate::types::Sha;

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Git produced an object name we could not parse.
    #[error("invalid SHA: {0}")]
    InvalidSha(String),

    /// The configured committer identity is unusable.
    #[error("invalid commit identity: {0}")]
    InvalidIdentity(String),

    /// IO error (including failure to spawn git at all).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for ledger commits and marker commits.
///
/// Passed via `-c` flags on commit-creating commands and also written to the
/// checkout's local config, so rebases replay commits under the same identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        CommitIdentity {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Rejects identities git would refuse to commit with.
    pub fn validate(&self) -> GitResult<()> {
        if self.name.trim().is_empty() {
            return Err(GitError::InvalidIdentity("empty name".to_string()));
        }
        if self.email.trim().is_empty() {
            return Err(GitError::InvalidIdentity("empty email".to_string()));
        }
        if self.name.contains(['<', '>', '\n']) || self.email.contains(['<', '>', '\n']) {
            return Err(GitError::InvalidIdentity(format!(
                "{} <{}>",
                self.name, self.email
            )));
        }
        Ok(())
    }
}

impl Default for CommitIdentity {
    fn default() -> Self {
        CommitIdentity::new(
            "webhook-ledger[bot]",
            "webhook-ledger@users.noreply.github.com",
        )
    }
}

/// Create a git Command with clean environment (no system/user config).
pub(crate) fn git_command(workdir: &Path) -> std::process::Command {
    use std::process::Command;

    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    // Rebase must never open an editor.
    cmd.env("GIT_EDITOR", "true");

    cmd
}

/// Create a git Command configured for commit-creating operations.
///
/// Prepends `-c user.name=<name> -c user.email=<email>`.
pub(crate) fn git_commit_command(
    workdir: &Path,
    identity: &CommitIdentity,
) -> std::process::Command {
    let mut cmd = git_command(workdir);
    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));
    cmd
}

fn check_output(args: &[&str], output: Output) -> GitResult<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let command = format!("git {}", args.join(" "));
        Err(GitError::CommandFailed { command, stderr })
    }
}

/// Run a git command in the given working directory.
pub fn run_git_sync(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let output = git_command(workdir).args(args).output()?;
    check_output(args, output)
}

/// Run a commit-creating git command under `identity`.
pub fn run_git_as(workdir: &Path, identity: &CommitIdentity, args: &[&str]) -> GitResult<Output> {
    let output = git_commit_command(workdir, identity).args(args).output()?;
    check_output(args, output)
}

/// Run a git command and return stdout as a string.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git_sync(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Get the SHA of a revision.
pub fn rev_parse(workdir: &Path, rev: &str) -> GitResult<Sha> {
    let sha_str = run_git_stdout(workdir, &["rev-parse", rev])?;
    Sha::parse(&sha_str).map_err(|_| GitError::InvalidSha(sha_str))
}

/// Resolve a revision, returning `None` if it does not exist (e.g. an unborn HEAD).
pub fn try_rev_parse(workdir: &Path, rev: &str) -> GitResult<Option<Sha>> {
    let output = git_command(workdir)
        .args(["rev-parse", "--verify", "--quiet", rev])
        .output()?;

    // --verify --quiet exits 1 without output when the revision is missing.
    match output.status.code() {
        Some(0) => {
            let sha_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Sha::parse(&sha_str)
                .map(Some)
                .map_err(|_| GitError::InvalidSha(sha_str))
        }
        Some(1) => Ok(None),
        _ => Err(GitError::CommandFailed {
            command: format!("git rev-parse --verify --quiet {}", rev),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }),
    }
}

/// Get the SHA a ref points to on `remote`, or `None` if the ref doesn't exist.
pub fn get_remote_ref(workdir: &Path, remote: &str, full_ref: &str) -> GitResult<Option<Sha>> {
    let stdout = run_git_stdout(workdir, &["ls-remote", remote, full_ref])?;

    // Format: "SHA\t<ref>"; ls-remote matches by suffix, so insist on the exact name.
    for line in stdout.lines() {
        let mut parts = line.split('\t');
        let (Some(sha_str), Some(name)) = (parts.next(), parts.next()) else {
            continue;
        };
        if name == full_ref {
            return Sha::parse(sha_str)
                .map(Some)
                .map_err(|_| GitError::InvalidSha(sha_str.to_string()));
        }
    }

    Ok(None)
}

/// Returns true if a rebase is stopped in the middle (conflict or otherwise).
pub fn is_rebase_in_progress(workdir: &Path) -> GitResult<bool> {
    let git_dir = run_git_stdout(workdir, &["rev-parse", "--absolute-git-dir"])?;
    let git_dir = Path::new(&git_dir);
    Ok(git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists())
}
