//! The marker substrate seam.
//!
//! A marker's presence is the only record that an event was admitted. Stores
//! must make `create` atomic: of any number of concurrent creators for the same
//! fingerprint, exactly one sees [`CreateOutcome::Created`].

use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::git::GitError;
pub use crate::persistence::CreateOutcome;

use super::fingerprint::Fingerprint;

/// Errors from a marker store.
#[derive(Debug, Error)]
pub enum MarkerError {
    /// IO error reading or writing a local marker.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The shared store could not be reached or refused the operation.
    #[error("shared marker store unavailable: {0}")]
    Unavailable(#[from] GitError),
}

/// Result type for marker operations.
pub type Result<T> = std::result::Result<T, MarkerError>;

/// A place markers can be published to and looked up in.
pub trait MarkerStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns true if a marker for `fingerprint` exists.
    fn exists(&self, fingerprint: &Fingerprint) -> Result<bool>;

    /// Creates the marker for `fingerprint` with value `first_seen`, unless one
    /// already exists. Never overwrites.
    fn create(
        &self,
        fingerprint: &Fingerprint,
        first_seen: DateTime<Utc>,
    ) -> Result<CreateOutcome>;
}

/// Formats a marker's stored value.
pub fn marker_value(first_seen: DateTime<Utc>) -> String {
    format!(
        "{}\n",
        first_seen.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    )
}
