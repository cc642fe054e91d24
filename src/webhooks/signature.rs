//! Webhook signature verification using HMAC-SHA256.
//!
//! Both supported providers sign with HMAC-SHA256 over a shared secret, but
//! differ in what they sign and how the signature travels:
//!
//! - Stripe sends `Stripe-Signature: t=<unix-seconds>,v1=<hex>` and signs
//!   `"<t>.<payload>"`. Signatures older or newer than
//!   [`STRIPE_TOLERANCE_SECS`] are refused.
//! - Razorpay sends `X-Razorpay-Signature: <hex>` over the raw payload.
//!
//! Verification is the first step in processing; nothing touches the gate or
//! the ledger until it passes.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use super::Provider;
use crate::types::EventId;

type HmacSha256 = Hmac<Sha256>;

/// Maximum distance between a Stripe signature's timestamp and now.
pub const STRIPE_TOLERANCE_SECS: i64 = 300;

/// Errors from provider selection and signature checks.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// The signature did not match, was malformed, or was outside tolerance.
    #[error("Webhook signature verification failed")]
    Mismatch { provider: Provider },
}

/// Result of checking one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub provider: Provider,
    pub verified: bool,
    /// The provider-assigned event identifier; empty when unverified.
    pub event_id: EventId,
}

impl Verification {
    /// Returns the event identifier, or [`SignatureError::Mismatch`] if the
    /// signature was not verified.
    pub fn require_verified(self) -> Result<EventId, SignatureError> {
        if self.verified {
            Ok(self.event_id)
        } else {
            Err(SignatureError::Mismatch {
                provider: self.provider,
            })
        }
    }
}

/// A parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSignatureHeader {
    pub timestamp: i64,
    /// Every `v1` signature present; any one of them may match.
    pub signatures: Vec<Vec<u8>>,
}

/// Parses a Stripe signature header (e.g. `t=1700000000,v1=abc123...`).
///
/// Returns `None` unless both a numeric `t` and at least one hex `v1` are
/// present. Unknown schemes (`v0`, ...) are ignored. Never panics.
pub fn parse_stripe_header(header: &str) -> Option<StripeSignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value.parse::<i64>().ok()?),
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    if signatures.is_empty() {
        return None;
    }
    Some(StripeSignatureHeader {
        timestamp: timestamp?,
        signatures,
    })
}

/// Computes the HMAC-SHA256 signature of a payload using the given secret.
///
/// This is useful for testing purposes (generating expected signatures).
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Verifies a Stripe signature header against the raw payload.
///
/// Returns `true` if any `v1` signature matches and the header's timestamp is
/// within [`STRIPE_TOLERANCE_SECS`] of `now`. Uses constant-time comparison.
pub fn verify_stripe(payload: &[u8], header: &str, secret: &[u8], now: DateTime<Utc>) -> bool {
    let Some(parsed) = parse_stripe_header(header) else {
        tracing::debug!("stripe signature header malformed");
        return false;
    };

    let skew = now.timestamp().saturating_sub(parsed.timestamp).saturating_abs();
    if skew > STRIPE_TOLERANCE_SECS {
        tracing::debug!(
            skew_secs = skew,
            "stripe signature timestamp outside tolerance"
        );
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(parsed.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    parsed
        .signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok())
}

/// Verifies a Razorpay signature (bare hex) against the raw payload.
///
/// Returns `false` for malformed hex or a mismatch; never panics.
pub fn verify_razorpay(payload: &[u8], signature: &str, secret: &[u8]) -> bool {
    let expected = match hex::decode(signature.trim()) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&expected).is_ok()
}

/// Verifies a delivery for `provider` and extracts its event identifier.
///
/// `raw` is the exact payload that was signed; `payload` is the same bytes
/// parsed as JSON.
pub fn verify(
    provider: Provider,
    raw: &[u8],
    payload: &Value,
    signature: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Verification {
    let verified = match provider {
        Provider::Stripe => verify_stripe(raw, signature, secret, now),
        Provider::Razorpay => verify_razorpay(raw, signature, secret),
    };

    let event_id = if verified {
        provider_event_id(provider, payload)
    } else {
        EventId::default()
    };

    tracing::debug!(%provider, verified, event_id = %event_id, "signature checked");
    Verification {
        provider,
        verified,
        event_id,
    }
}

/// The identifier a provider assigns to the event in `payload`.
///
/// Stripe puts it at `.id`. Razorpay events carry no top-level identifier, so
/// the payment's (or failing that the order's) entity id stands in; if
/// neither is present the result is empty.
pub fn provider_event_id(provider: Provider, payload: &Value) -> EventId {
    match provider {
        Provider::Stripe => EventId::new(non_empty_str(payload.get("id")).unwrap_or_default()),
        Provider::Razorpay => EventId::new(razorpay_entity_id(payload).unwrap_or_default()),
    }
}

pub(crate) fn razorpay_entity_id(payload: &Value) -> Option<&str> {
    non_empty_str(payload.pointer("/payload/payment/entity/id"))
        .or_else(|| non_empty_str(payload.pointer("/payload/order/entity/id")))
}

/// The event identifier used when verification is skipped (local runs).
///
/// Takes `.id`, then `.entity`, then falls back to `local_<unix-millis>`.
pub fn unverified_event_id(payload: &Value, now: DateTime<Utc>) -> EventId {
    non_empty_str(payload.get("id"))
        .or_else(|| non_empty_str(payload.get("entity")))
        .map(EventId::from)
        .unwrap_or_else(|| EventId::new(format!("local_{}", now.timestamp_millis())))
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}
