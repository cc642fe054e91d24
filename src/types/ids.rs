//! Newtype wrappers for domain identifiers.
//!
//! These types keep sender-assigned event identifiers, content digests and git
//! object names apart, so a content hash can never be passed where a commit SHA
//! or a marker fingerprint is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Error returned when a string is not a well-formed lowercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind}: expected {expected} lowercase hex characters, got {value:?}")]
pub struct InvalidDigest {
    pub kind: &'static str,
    pub expected: usize,
    pub value: String,
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// The sender-assigned identifier of one logical event (e.g. Stripe's `evt_...`).
///
/// The value is opaque; the only constraint enforced by the gate is that it is
/// non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(s: impl Into<String>) -> Self {
        EventId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        EventId(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}

/// SHA-256 digest of a normalized event, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parses a 64-character lowercase hex digest.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidDigest> {
        let s = s.into();
        if is_lower_hex(&s, SHA256_HEX_LEN) {
            Ok(ContentHash(s))
        } else {
            Err(InvalidDigest {
                kind: "content hash",
                expected: SHA256_HEX_LEN,
                value: s,
            })
        }
    }

    /// Wraps raw digest bytes.
    pub fn from_digest(bytes: &[u8]) -> Self {
        ContentHash(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = InvalidDigest;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        ContentHash::parse(s)
    }
}

impl From<ContentHash> for String {
    fn from(h: ContentHash) -> Self {
        h.0
    }
}

/// A git object name (40 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha(String);

impl Sha {
    /// Parses a full 40-character object name.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidDigest> {
        let s = s.into();
        if is_lower_hex(&s, 40) {
            Ok(Sha(s))
        } else {
            Err(InvalidDigest {
                kind: "SHA",
                expected: 40,
                value: s,
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the SHA for display.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
