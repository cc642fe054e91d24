//! Optimistic-concurrency append to the shared ledger branch.
//!
//! ```text
//! INIT -> ESTABLISH_IDENTITY -> SYNC_BRANCH -> STAGE -> DIFF_CHECK
//!                                   ^                      |  \
//!                                   |                      |   no change -> DONE
//!                                 RETRY <- conflict --- COMMIT -> REBASE -> PUSH -> DONE
//!                                   |  <------------- rejected / error ------'
//!                                   '-> FAILED (attempts exhausted)
//! ```
//!
//! The entry is durably appended to the local journal before anything touches
//! the remote. Every attempt then starts from a fresh sync of the remote tip,
//! so a line that another writer already pushed is found there and not
//! appended twice. The remote's refusal of a stale push is the only
//! coordination between writers.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use super::entry::LedgerEntry;
use super::retry::RetryConfig;
use super::substrate::{
    BranchSubstrate, Checkout, PushOutcome, RebaseOutcome, RemoteTip, SubstrateError,
};
use super::workspace::{LEDGER_FILE, LedgerWorkspace, materialize_entry};
use super::{LedgerError, Result};
use crate::git::CommitIdentity;
use crate::types::ExecutionMode;

/// How an append finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// This invocation pushed a commit containing the entry.
    Pushed { attempts: u32 },
    /// The branch already contained the entry; nothing was committed.
    AlreadyRecorded { attempts: u32 },
    /// Local-only mode: the entry is in the local journal only.
    LocalOnly,
}

impl AppendOutcome {
    /// Returns true if the shared branch is known to contain the entry.
    pub fn is_shared(&self) -> bool {
        !matches!(self, AppendOutcome::LocalOnly)
    }

    pub fn attempts(&self) -> u32 {
        match self {
            AppendOutcome::Pushed { attempts } | AppendOutcome::AlreadyRecorded { attempts } => {
                *attempts
            }
            AppendOutcome::LocalOnly => 0,
        }
    }
}

/// Why one attempt did not reach DONE.
#[derive(Debug)]
enum AttemptFailure {
    /// A concurrent writer changed the branch underneath the rebase.
    ConflictDetected,
    /// The remote refused the push.
    PushRejected(String),
    /// The substrate or the checkout's file system failed.
    SubstrateUnavailable(SubstrateError),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::ConflictDetected => write!(f, "conflict while rebasing onto remote"),
            AttemptFailure::PushRejected(details) => write!(f, "push rejected: {}", details),
            AttemptFailure::SubstrateUnavailable(e) => write!(f, "substrate error: {}", e),
        }
    }
}

impl From<SubstrateError> for AttemptFailure {
    fn from(e: SubstrateError) -> Self {
        AttemptFailure::SubstrateUnavailable(e)
    }
}

impl From<std::io::Error> for AttemptFailure {
    fn from(e: std::io::Error) -> Self {
        AttemptFailure::SubstrateUnavailable(SubstrateError::Io(e))
    }
}

/// Terminal state of a successful attempt.
enum Done {
    Pushed,
    AlreadyRecorded,
}

/// Appends ledger entries through a [`BranchSubstrate`].
pub struct LedgerAppender<S> {
    substrate: S,
    workspace: LedgerWorkspace,
    mode: ExecutionMode,
    retry: RetryConfig,
    identity: CommitIdentity,
    sleep: fn(Duration),
}

impl<S: BranchSubstrate> LedgerAppender<S> {
    pub fn new(substrate: S, workspace: LedgerWorkspace, mode: ExecutionMode) -> Self {
        LedgerAppender {
            substrate,
            workspace,
            mode,
            retry: RetryConfig::default(),
            identity: CommitIdentity::default(),
            sleep: std::thread::sleep,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_identity(mut self, identity: CommitIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Replaces the backoff sleep (tests record delays instead of waiting).
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn workspace(&self) -> &LedgerWorkspace {
        &self.workspace
    }

    /// Durably records `entry` locally, then converges it into `entry.branch`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] if the entry can't be written as one line
    /// - [`LedgerError::Journal`] if the local journal append fails
    /// - [`LedgerError::WriteFailed`] once every attempt has failed; the entry
    ///   is in the local journal but not on the shared branch
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<AppendOutcome> {
        entry.validate()?;

        self.workspace
            .append_to_journal(entry)
            .map_err(LedgerError::Journal)?;
        tracing::debug!(
            event_id = %entry.event_id,
            journal = %self.workspace.journal_path().display(),
            "entry written to local journal"
        );

        if !self.mode.is_shared() {
            tracing::info!(event_id = %entry.event_id, "local-only mode, skipping shared ledger");
            return Ok(AppendOutcome::LocalOnly);
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_failure = None;
        tracing::debug!(
            event_id = %entry.event_id,
            max_attempts,
            max_wait_ms = self.retry.total_max_wait().as_millis() as u64,
            "appending ledger entry"
        );

        for attempt in 1..=max_attempts {
            match self.attempt(entry) {
                Ok(Done::Pushed) => {
                    tracing::info!(
                        event_id = %entry.event_id,
                        branch = %entry.branch,
                        attempt,
                        "ledger entry pushed"
                    );
                    return Ok(AppendOutcome::Pushed { attempts: attempt });
                }
                Ok(Done::AlreadyRecorded) => {
                    tracing::info!(
                        event_id = %entry.event_id,
                        branch = %entry.branch,
                        attempt,
                        "ledger entry already on branch"
                    );
                    return Ok(AppendOutcome::AlreadyRecorded { attempts: attempt });
                }
                Err(failure) => {
                    tracing::warn!(
                        event_id = %entry.event_id,
                        branch = %entry.branch,
                        attempt,
                        max_attempts,
                        error = %failure,
                        "ledger append attempt failed"
                    );
                    self.revert_local_mutations();
                    last_failure = Some(failure);

                    if attempt < max_attempts {
                        let delay = self.retry.delay_for_attempt(attempt - 1);
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off");
                        (self.sleep)(delay);
                    }
                }
            }
        }

        let last_error = last_failure
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no attempt was made".to_string());
        tracing::error!(
            event_id = %entry.event_id,
            branch = %entry.branch,
            attempts = max_attempts,
            error = %last_error,
            "ledger append failed"
        );
        Err(LedgerError::WriteFailed {
            event_id: entry.event_id.clone(),
            attempts: max_attempts,
            last_error,
        })
    }

    /// One pass from ESTABLISH_IDENTITY to DONE.
    fn attempt(&mut self, entry: &LedgerEntry) -> std::result::Result<Done, AttemptFailure> {
        let branch = entry.branch.as_str();

        // ESTABLISH_IDENTITY
        self.substrate.establish_identity(&self.identity)?;

        // SYNC_BRANCH
        let tip = self.substrate.fetch(branch)?;
        let checkout = self.substrate.checkout_or_create(branch)?;
        match (&tip, checkout) {
            (RemoteTip::Present(sha), Checkout::Tracking) => {
                tracing::debug!(branch, tip = %sha.short(), "synced to remote tip");
            }
            _ => tracing::debug!(branch, "ledger branch missing remotely, bootstrapping"),
        }
        let ledger_path = self.substrate.worktree().join(LEDGER_FILE);
        materialize_entry(&ledger_path, entry)?;

        // STAGE
        self.substrate.stage_file(Path::new(LEDGER_FILE))?;

        // DIFF_CHECK
        if !self.substrate.has_staged_changes()? {
            return Ok(Done::AlreadyRecorded);
        }

        // COMMIT
        let message = format!("ledger: {}", entry.event_id);
        self.substrate.commit(&message)?;

        // REBASE
        match self.substrate.rebase_onto_remote(branch)? {
            RebaseOutcome::Rebased | RebaseOutcome::NoUpstream => {}
            RebaseOutcome::Conflict => return Err(AttemptFailure::ConflictDetected),
        }

        // PUSH
        match self.substrate.push(branch)? {
            PushOutcome::Pushed => Ok(Done::Pushed),
            // The rebase dropped our commit: the remote already had the line.
            PushOutcome::UpToDate => Ok(Done::AlreadyRecorded),
            PushOutcome::Rejected { details } => Err(AttemptFailure::PushRejected(details)),
        }
    }

    /// RETRY: discard everything the failed attempt left in the checkout.
    fn revert_local_mutations(&mut self) {
        if let Err(e) = self.substrate.reset_hard() {
            tracing::warn!(error = %e, "failed to reset ledger checkout");
        }
        if let Err(e) = self.substrate.clean_working_tree() {
            tracing::warn!(error = %e, "failed to clean ledger checkout");
        }
    }
}

impl<S> fmt::Debug for LedgerAppender<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerAppender")
            .field("workspace", &self.workspace)
            .field("mode", &self.mode)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
