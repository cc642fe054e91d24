//! Branch substrate over a dedicated git checkout.
//!
//! The checkout's `origin` is the shared remote. The remote-tracking ref
//! `refs/remotes/origin/<branch>` is the "last fetched tip"; it is deleted
//! when the remote no longer has the branch, so its presence always tells
//! whether the branch must be bootstrapped.

use std::path::{Path, PathBuf};

use super::substrate::{
    BranchSubstrate, Checkout, PushOutcome, RebaseOutcome, RemoteTip, Result, SubstrateError,
};
use crate::git::checkout::{ORIGIN, configure_identity, open_checkout};
use crate::git::push::{PushResult, push_head_to_branch};
use crate::git::recovery::{abort_rebase, clean_untracked};
use crate::git::{
    CommitIdentity, GitError, get_remote_ref, git_command, is_rebase_in_progress, run_git_as,
    run_git_sync, try_rev_parse,
};

/// Branch substrate backed by a local checkout and the `git` binary.
#[derive(Debug)]
pub struct GitBranchSubstrate {
    dir: PathBuf,
    identity: CommitIdentity,
    branch: Option<String>,
}

fn tracking_ref(branch: &str) -> String {
    format!("refs/remotes/{}/{}", ORIGIN, branch)
}

impl GitBranchSubstrate {
    /// Opens (creating if needed) the checkout at `dir` pointing at `remote_url`.
    pub fn open(dir: &Path, remote_url: &str) -> Result<Self> {
        let dir = open_checkout(dir, remote_url)?;
        Ok(GitBranchSubstrate {
            dir,
            identity: CommitIdentity::default(),
            branch: None,
        })
    }

    /// Points HEAD at an unborn `branch` with an empty index and working tree.
    fn start_empty_branch(&self, branch: &str) -> Result<()> {
        let head_ref = format!("refs/heads/{}", branch);
        run_git_sync(&self.dir, &["symbolic-ref", "HEAD", &head_ref])?;
        if try_rev_parse(&self.dir, &head_ref)?.is_some() {
            run_git_sync(&self.dir, &["update-ref", "-d", &head_ref])?;
        }
        run_git_sync(&self.dir, &["read-tree", "--empty"])?;
        clean_untracked(&self.dir)?;
        Ok(())
    }

    /// Returns true if `ancestor` is reachable from HEAD.
    fn head_contains(&self, ancestor: &str) -> Result<bool> {
        let output = git_command(&self.dir)
            .args(["merge-base", "--is-ancestor", ancestor, "HEAD"])
            .output()?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::CommandFailed {
                command: format!("git merge-base --is-ancestor {} HEAD", ancestor),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
            .into()),
        }
    }
}

impl BranchSubstrate for GitBranchSubstrate {
    fn worktree(&self) -> &Path {
        &self.dir
    }

    fn establish_identity(&mut self, identity: &CommitIdentity) -> Result<()> {
        configure_identity(&self.dir, identity)?;
        self.identity = identity.clone();
        Ok(())
    }

    fn fetch(&mut self, branch: &str) -> Result<RemoteTip> {
        let remote_ref = format!("refs/heads/{}", branch);
        let tracking = tracking_ref(branch);

        match get_remote_ref(&self.dir, ORIGIN, &remote_ref)? {
            Some(_) => {
                let refspec = format!("+{}:{}", remote_ref, tracking);
                run_git_sync(&self.dir, &["fetch", "--quiet", ORIGIN, &refspec])?;
                // Report what was actually fetched; the remote may have moved
                // since ls-remote.
                let fetched = try_rev_parse(&self.dir, &tracking)?.ok_or_else(|| {
                    SubstrateError::Unavailable(format!("fetch did not create {}", tracking))
                })?;
                Ok(RemoteTip::Present(fetched))
            }
            None => {
                if try_rev_parse(&self.dir, &tracking)?.is_some() {
                    run_git_sync(&self.dir, &["update-ref", "-d", &tracking])?;
                }
                Ok(RemoteTip::Missing)
            }
        }
    }

    fn checkout_or_create(&mut self, branch: &str) -> Result<Checkout> {
        abort_rebase(&self.dir)?;
        clean_untracked(&self.dir)?;
        self.branch = Some(branch.to_string());

        let tracking = tracking_ref(branch);
        if try_rev_parse(&self.dir, &tracking)?.is_some() {
            run_git_sync(&self.dir, &["checkout", "--quiet", "-f", "-B", branch, &tracking])?;
            Ok(Checkout::Tracking)
        } else {
            self.start_empty_branch(branch)?;
            Ok(Checkout::Bootstrapped)
        }
    }

    fn stage_file(&mut self, path: &Path) -> Result<()> {
        let path = path
            .to_str()
            .ok_or_else(|| SubstrateError::Unavailable(format!("non-UTF-8 path {:?}", path)))?;
        run_git_sync(&self.dir, &["add", "--", path])?;
        Ok(())
    }

    fn has_staged_changes(&mut self) -> Result<bool> {
        // An unborn branch has nothing to diff against; anything in the index
        // is a change.
        if try_rev_parse(&self.dir, "HEAD")?.is_none() {
            let output = run_git_sync(&self.dir, &["ls-files", "--cached"])?;
            return Ok(!output.stdout.is_empty());
        }

        let output = git_command(&self.dir)
            .args(["diff", "--cached", "--quiet"])
            .output()?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(GitError::CommandFailed {
                command: "git diff --cached --quiet".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
            .into()),
        }
    }

    fn commit(&mut self, message: &str) -> Result<()> {
        run_git_as(
            &self.dir,
            &self.identity,
            &["commit", "--quiet", "--no-verify", "-m", message],
        )?;
        Ok(())
    }

    fn rebase_onto_remote(&mut self, branch: &str) -> Result<RebaseOutcome> {
        let upstream = match self.fetch(branch)? {
            RemoteTip::Present(sha) => sha,
            RemoteTip::Missing => return Ok(RebaseOutcome::NoUpstream),
        };

        if self.head_contains(upstream.as_str())? {
            return Ok(RebaseOutcome::Rebased);
        }

        let result = run_git_as(&self.dir, &self.identity, &["rebase", upstream.as_str()]);
        match result {
            Ok(_) => Ok(RebaseOutcome::Rebased),
            Err(e) => {
                if is_rebase_in_progress(&self.dir)? {
                    run_git_sync(&self.dir, &["rebase", "--abort"])?;
                    tracing::debug!(branch, upstream = %upstream.short(), "rebase conflicted, aborted");
                    Ok(RebaseOutcome::Conflict)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    fn push(&mut self, branch: &str) -> Result<PushOutcome> {
        match push_head_to_branch(&self.dir, ORIGIN, branch)? {
            PushResult::Success { pushed_sha } => {
                tracing::debug!(branch, sha = %pushed_sha.short(), "pushed ledger commit");
                Ok(PushOutcome::Pushed)
            }
            PushResult::AlreadyUpToDate => Ok(PushOutcome::UpToDate),
            PushResult::Rejected { details } => Ok(PushOutcome::Rejected { details }),
        }
    }

    fn reset_hard(&mut self) -> Result<()> {
        abort_rebase(&self.dir)?;

        let Some(branch) = self.branch.clone() else {
            crate::git::recovery::reset_hard(&self.dir)?;
            return Ok(());
        };

        let tracking = tracking_ref(&branch);
        if try_rev_parse(&self.dir, &tracking)?.is_some() {
            run_git_sync(&self.dir, &["reset", "--quiet", "--hard", &tracking])?;
        } else {
            self.start_empty_branch(&branch)?;
        }
        Ok(())
    }

    fn clean_working_tree(&mut self) -> Result<()> {
        clean_untracked(&self.dir)?;
        Ok(())
    }
}
