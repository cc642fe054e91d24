//! End-to-end processing of one webhook delivery.
//!
//! ```text
//! parse payload -> verify signature (or skip) -> admit -> normalize + hash
//!               -> build ledger entry -> append -> receipt
//! ```
//!
//! A signature failure or a duplicate stops processing before anything is
//! written to the ledger. The gate has already recorded a first-seen event by
//! the time the ledger is touched, so a ledger failure leaves the event marked
//! as seen; the entry itself is still in the local journal.

pub mod summary;

pub use summary::{ReportTargets, publish, render_summary, write_outputs};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::gate::{GateError, IdempotencyGate};
use crate::ledger::{AppendOutcome, BranchSubstrate, LedgerAppender, LedgerEntry, LedgerError};
use crate::types::{ContentHash, EventId};
use crate::webhooks::{
    NormalizeError, NormalizedEvent, Provider, SignatureError, unverified_event_id, verify,
};

/// Errors that stop processing of a delivery.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid payload JSON: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The delivery verified but carries no event identifier to deduplicate on.
    #[error("webhook from {provider} carries no event identifier")]
    MissingEventId { provider: Provider },

    #[error("Duplicate webhook detected: {0}")]
    DuplicateEvent(EventId),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// How the delivery's authenticity is established.
#[derive(Clone, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Verify `signature` with the shared `secret`.
    Verify { signature: String, secret: String },
    /// Trust the payload as-is (local runs and tests).
    Skip,
}

impl std::fmt::Debug for SignatureCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureCheck::Verify { signature, .. } => f
                .debug_struct("Verify")
                .field("signature", signature)
                .field("secret", &"<redacted>")
                .finish(),
            SignatureCheck::Skip => write!(f, "Skip"),
        }
    }
}

/// One delivery to process.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub provider: Provider,
    /// The raw payload exactly as signed.
    pub payload: String,
    pub check: SignatureCheck,
    pub ledger_branch: String,
}

/// What a successfully processed delivery produced.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub event_id: EventId,
    pub event_hash: ContentHash,
    pub normalized: NormalizedEvent,
    /// Compact JSON of `normalized`, as hashed.
    pub normalized_json: String,
    pub first_seen: bool,
    pub entry_written: bool,
    pub outcome: AppendOutcome,
}

/// The gate and the ledger, wired together for one execution mode.
pub struct Pipeline<S> {
    gate: IdempotencyGate,
    appender: LedgerAppender<S>,
}

impl<S: BranchSubstrate> Pipeline<S> {
    pub fn new(gate: IdempotencyGate, appender: LedgerAppender<S>) -> Self {
        Pipeline { gate, appender }
    }

    pub fn gate(&self) -> &IdempotencyGate {
        &self.gate
    }

    pub fn appender(&self) -> &LedgerAppender<S> {
        &self.appender
    }

    /// Processes `request` at the current time.
    pub fn process(&mut self, request: &WebhookRequest) -> Result<Receipt> {
        self.process_at(request, Utc::now())
    }

    /// Processes `request` as if received at `now`.
    pub fn process_at(&mut self, request: &WebhookRequest, now: DateTime<Utc>) -> Result<Receipt> {
        let payload: Value =
            serde_json::from_str(&request.payload).map_err(PipelineError::InvalidPayload)?;

        let event_id = match &request.check {
            SignatureCheck::Skip => {
                tracing::info!(provider = %request.provider, "skipping signature verification");
                unverified_event_id(&payload, now)
            }
            SignatureCheck::Verify { signature, secret } => verify(
                request.provider,
                request.payload.as_bytes(),
                &payload,
                signature,
                secret.as_bytes(),
                now,
            )
            .require_verified()?,
        };
        if event_id.is_empty() {
            return Err(PipelineError::MissingEventId {
                provider: request.provider,
            });
        }
        tracing::info!(provider = %request.provider, event_id = %event_id, "webhook accepted");

        if !self.gate.admit_at(&event_id, now)?.is_first_seen() {
            tracing::warn!(event_id = %event_id, "duplicate webhook");
            return Err(PipelineError::DuplicateEvent(event_id));
        }

        let normalized = NormalizedEvent::from_payload(request.provider, &payload)?;
        let normalized_json = normalized.to_json()?;
        let event_hash = normalized.content_hash()?;

        let entry = LedgerEntry::new(
            now,
            event_id.clone(),
            event_hash.clone(),
            request.ledger_branch.clone(),
        );
        let outcome = self.appender.append(&entry)?;
        tracing::info!(
            event_id = %event_id,
            event_hash = %event_hash,
            ?outcome,
            "webhook recorded"
        );

        Ok(Receipt {
            event_id,
            event_hash,
            normalized,
            normalized_json,
            first_seen: true,
            entry_written: true,
            outcome,
        })
    }
}
