//! Marker store backed by refs on the shared git remote.
//!
//! Each marker is a ref `refs/webhook-markers/webhook-event-<fp>` pointing at
//! a parentless commit with an empty tree whose message records the first-seen
//! time. Creation pushes without force: the remote accepts a new ref only if
//! it does not exist yet, and refuses to replace an existing marker with an
//! unrelated commit, so exactly one of several racing creators wins.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Utc};

use super::fingerprint::Fingerprint;
use super::marker::{CreateOutcome, MarkerError, MarkerStore, Result, marker_value};
use crate::git::checkout::{ORIGIN, open_scratch};
use crate::git::push::{PushResult, push_ref};
use crate::git::{CommitIdentity, GitError, get_remote_ref, git_command, run_git_as};

/// Namespace on the remote holding marker refs.
pub const MARKER_REF_NAMESPACE: &str = "refs/webhook-markers";

/// Marker store over remote refs, using a local bare scratch repository to
/// build marker commits.
#[derive(Debug, Clone)]
pub struct GitRefMarkerStore {
    scratch: PathBuf,
    identity: CommitIdentity,
}

impl GitRefMarkerStore {
    /// Opens the store, creating the scratch repository at `scratch_dir` if
    /// needed and pointing it at `remote_url`.
    pub fn open(scratch_dir: &Path, remote_url: &str, identity: CommitIdentity) -> Result<Self> {
        identity.validate()?;
        let scratch = open_scratch(scratch_dir, remote_url)?;
        Ok(GitRefMarkerStore { scratch, identity })
    }

    /// Full ref name of the marker for `fingerprint`.
    pub fn marker_ref(fingerprint: &Fingerprint) -> String {
        format!("{}/{}", MARKER_REF_NAMESPACE, fingerprint.marker_key())
    }

    fn empty_tree(&self) -> std::result::Result<String, GitError> {
        let output = git_command(&self.scratch)
            .arg("mktree")
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: "git mktree".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Builds a marker commit unique to this process and instant.
    fn marker_commit(
        &self,
        fingerprint: &Fingerprint,
        first_seen: DateTime<Utc>,
    ) -> std::result::Result<String, GitError> {
        let tree = self.empty_tree()?;
        let message = format!(
            "marker: {}\n\nfirst-seen: {}nonce: {}-{}\n",
            fingerprint.marker_key(),
            marker_value(first_seen),
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let output = run_git_as(
            &self.scratch,
            &self.identity,
            &["commit-tree", &tree, "-m", &message],
        )?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl MarkerStore for GitRefMarkerStore {
    fn name(&self) -> &'static str {
        "git-refs"
    }

    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let found = get_remote_ref(&self.scratch, ORIGIN, &Self::marker_ref(fingerprint))?;
        Ok(found.is_some())
    }

    fn create(
        &self,
        fingerprint: &Fingerprint,
        first_seen: DateTime<Utc>,
    ) -> Result<CreateOutcome> {
        let commit = self.marker_commit(fingerprint, first_seen)?;
        let marker_ref = Self::marker_ref(fingerprint);

        match push_ref(&self.scratch, ORIGIN, &commit, &marker_ref)? {
            PushResult::Success { .. } | PushResult::AlreadyUpToDate => {
                tracing::debug!(marker = %marker_ref, "published shared marker");
                Ok(CreateOutcome::Created)
            }
            PushResult::Rejected { details } => {
                // A declined push is only a lost race if the marker is now there.
                if get_remote_ref(&self.scratch, ORIGIN, &marker_ref)?.is_some() {
                    tracing::debug!(marker = %marker_ref, details = %details, "marker already published");
                    return Ok(CreateOutcome::AlreadyExists);
                }
                tracing::warn!(marker = %marker_ref, details = %details, "remote declined marker");
                Err(MarkerError::Unavailable(GitError::CommandFailed {
                    command: format!("git push {} {}", ORIGIN, marker_ref),
                    stderr: details,
                }))
            }
        }
    }
}
