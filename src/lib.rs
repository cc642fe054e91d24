//! Webhook Ledger - exactly-once admission of signed webhooks, recorded in an
//! append-only ledger on a shared git branch.
//!
//! This library provides the idempotency gate, the ledger append protocol and
//! the provider-specific verification and normalization that feed them.

pub mod config;
pub mod gate;
pub mod git;
pub mod ledger;
pub mod persistence;
pub mod pipeline;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
