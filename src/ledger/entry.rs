//! One ledger record and its line format.
//!
//! ```text
//! 2024-01-15T12:00:00.000Z | evt_1 | 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//! ```
//!
//! Timestamps are UTC with millisecond precision and a `Z` suffix. The branch
//! is part of the record but not of the line: every line in a branch's ledger
//! file belongs to that branch.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ContentHash, EventId};

/// Separator between the fields of a ledger line.
pub const FIELD_SEPARATOR: &str = " | ";

/// Why an entry or line was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("event identifier is empty")]
    EmptyEventId,

    /// A line break in the identifier would split the record over two lines.
    #[error("event identifier contains a line break: {0:?}")]
    MultilineEventId(String),

    #[error("branch name is empty")]
    EmptyBranch,

    #[error("malformed ledger line: {0:?}")]
    MalformedLine(String),
}

/// An immutable record of one accepted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub event_id: EventId,
    pub content_hash: ContentHash,
    pub branch: String,
}

impl LedgerEntry {
    /// Builds an entry, truncating the timestamp to the millisecond so the
    /// entry round-trips through its line exactly.
    pub fn new(
        timestamp: DateTime<Utc>,
        event_id: EventId,
        content_hash: ContentHash,
        branch: impl Into<String>,
    ) -> Self {
        let millis = timestamp.timestamp_millis();
        let timestamp = DateTime::from_timestamp_millis(millis).unwrap_or(timestamp);
        LedgerEntry {
            timestamp,
            event_id,
            content_hash,
            branch: branch.into(),
        }
    }

    /// Checks the entry can be written as a single line.
    pub fn validate(&self) -> Result<(), EntryError> {
        if self.event_id.as_str().trim().is_empty() {
            return Err(EntryError::EmptyEventId);
        }
        if self.event_id.as_str().contains(['\n', '\r']) {
            return Err(EntryError::MultilineEventId(
                self.event_id.as_str().to_string(),
            ));
        }
        if self.branch.trim().is_empty() {
            return Err(EntryError::EmptyBranch);
        }
        Ok(())
    }

    /// The timestamp as written in the ledger.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// The serialized line, including the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}\n",
            self.timestamp_string(),
            self.event_id,
            self.content_hash,
            sep = FIELD_SEPARATOR
        )
    }

    /// Parses a line (with or without its trailing newline) read from `branch`.
    ///
    /// The event identifier may itself contain the separator; the timestamp is
    /// taken from the left and the hash from the right.
    pub fn parse_line(line: &str, branch: &str) -> Result<Self, EntryError> {
        let malformed = || EntryError::MalformedLine(line.to_string());
        let trimmed = line.strip_suffix('\n').unwrap_or(line);

        let (timestamp, rest) = trimmed.split_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
        let (event_id, hash) = rest.rsplit_once(FIELD_SEPARATOR).ok_or_else(malformed)?;

        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| malformed())?
            .with_timezone(&Utc);
        let content_hash = ContentHash::parse(hash).map_err(|_| malformed())?;

        let entry = LedgerEntry {
            timestamp,
            event_id: EventId::new(event_id),
            content_hash,
            branch: branch.to_string(),
        };
        entry.validate().map_err(|_| malformed())?;
        Ok(entry)
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line().trim_end())
    }
}

/// Returns true if `contents` (a whole ledger file) contains `line` as one of
/// its lines. `line` may carry its trailing newline.
pub fn contains_line(contents: &str, line: &str) -> bool {
    let needle = line.strip_suffix('\n').unwrap_or(line);
    contents.lines().any(|l| l == needle)
}
