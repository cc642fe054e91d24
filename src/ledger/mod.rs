//! Append-only ledger of accepted events on a shared branch.
//!
//! Every accepted event becomes one line in `ledger.log` on the ledger branch
//! (default `webhook-ledger`). Lines are only ever appended; a pushed line is
//! never rewritten. Concurrent writers coordinate solely through the remote
//! rejecting non-fast-forward pushes; see [`protocol`] for the state machine.

pub mod entry;
pub mod git_substrate;
#[cfg(test)]
pub(crate) mod memory;
pub mod protocol;
pub mod retry;
pub mod substrate;
pub mod workspace;


pub use entry::{EntryError, LedgerEntry};
pub use git_substrate::GitBranchSubstrate;
pub use protocol::{AppendOutcome, LedgerAppender};
pub use retry::RetryConfig;
pub use substrate::{
    BranchSubstrate, Checkout, DetachedSubstrate, PushOutcome, RebaseOutcome, RemoteTip,
    SubstrateError,
};
pub use workspace::{LEDGER_FILE, LedgerWorkspace};

use thiserror::Error;

use crate::types::EventId;

/// Default name of the ledger branch.
pub const DEFAULT_BRANCH: &str = "webhook-ledger";

/// Errors that escape the append protocol.
///
/// Conflicts, rejections and substrate failures are retried inside the
/// protocol and only surface, as `WriteFailed`, once attempts run out.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The entry can't be written.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] EntryError),

    /// The local journal append failed; nothing was attempted remotely.
    #[error("failed to write local journal: {0}")]
    Journal(#[source] std::io::Error),

    /// Every attempt to converge the entry into the shared branch failed.
    #[error("ledger write failed for {event_id} after {attempts} attempt(s): {last_error}")]
    WriteFailed {
        event_id: EventId,
        attempts: u32,
        last_error: String,
    },
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
