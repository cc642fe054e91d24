//! Provider webhooks: signature verification and normalization.
//!
//! This module provides:
//! - Signature verification for Stripe and Razorpay payloads (HMAC-SHA256)
//! - Extraction of the provider-assigned event identifier
//! - A provider-independent normalized form of each event and its content hash

pub mod normalize;
pub mod signature;

pub use normalize::{NormalizeError, NormalizedEvent, RazorpayEvent, StripeEvent};
pub use signature::{
    STRIPE_TOLERANCE_SECS, SignatureError, StripeSignatureHeader, Verification,
    compute_signature, parse_stripe_header, provider_event_id, unverified_event_id, verify,
    verify_razorpay, verify_stripe,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A webhook sender whose signature scheme and payload shape are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Stripe,
    Razorpay,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Razorpay => "razorpay",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(Provider::Stripe),
            "razorpay" => Ok(Provider::Razorpay),
            _ => Err(SignatureError::UnsupportedProvider(s.to_string())),
        }
    }
}
