//! Crash-safe local file primitives.
//!
//! Everything the crate writes locally (dedupe markers, the ledger journal)
//! goes through these helpers so that a successful return means the bytes and
//! the directory entry are on disk.

pub mod fsync;

pub use fsync::{CreateOutcome, append_synced, create_new_synced, fsync_dir, fsync_file};
