//! Content-addressed marker keys for event identifiers.
//!
//! Event identifiers are chosen by the sender and may contain anything, so
//! they are never used as file names or ref names directly. The SHA-256 of the
//! identifier is used instead: fixed length, hex only, and the same on every
//! machine.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::types::EventId;

/// Prefix of every marker key.
pub const MARKER_KEY_PREFIX: &str = "webhook-event-";

/// SHA-256 of an event identifier, as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprints an event identifier.
    pub fn of(event_id: &EventId) -> Self {
        let digest = Sha256::digest(event_id.as_str().as_bytes());
        Fingerprint(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The marker key, `webhook-event-<fingerprint>`.
    pub fn marker_key(&self) -> String {
        format!("{}{}", MARKER_KEY_PREFIX, self.0)
    }

    /// First two hex characters, used to fan markers out over directories.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
