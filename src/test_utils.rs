//! Shared test utilities and arbitrary generators for property-based testing.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use sha2::{Digest, Sha256};

use crate::ledger::{DEFAULT_BRANCH, LedgerEntry};
use crate::types::{ContentHash, EventId, Sha};

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{40}".prop_map(|s| Sha::parse(s).unwrap())
}

pub fn arb_content_hash() -> impl Strategy<Value = ContentHash> {
    "[0-9a-f]{64}".prop_map(|s| ContentHash::parse(s).unwrap())
}

/// Event identifiers as providers send them, plus a few awkward ones.
pub fn arb_event_id() -> impl Strategy<Value = EventId> {
    prop_oneof![
        "evt_[A-Za-z0-9]{8,24}".prop_map(EventId::from),
        "pay_[A-Za-z0-9]{14}".prop_map(EventId::from),
        "[a-z][a-z0-9 |_-]{0,30}[a-z]".prop_map(EventId::from),
    ]
}

/// Timestamps between 2000 and 2100 at millisecond precision.
pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800_000i64..4_102_444_800_000i64)
        .prop_map(|ms| DateTime::from_timestamp_millis(ms).unwrap())
}

pub fn arb_entry() -> impl Strategy<Value = LedgerEntry> {
    (arb_timestamp(), arb_event_id(), arb_content_hash())
        .prop_map(|(ts, id, h)| LedgerEntry::new(ts, id, h, DEFAULT_BRANCH))
}

/// A fixed, valid entry for `event_id` on the default branch.
pub fn sample_entry(event_id: &str) -> LedgerEntry {
    LedgerEntry::new(
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        EventId::new(event_id),
        ContentHash::from_digest(&Sha256::digest(event_id.as_bytes())),
        DEFAULT_BRANCH,
    )
}
