//! Provider-independent form of an event, and its content hash.
//!
//! The normalized event keeps the fields that identify what happened and
//! drops delivery noise. Its compact JSON serialization, with field order
//! fixed by the struct definitions below and nested objects kept in the order
//! they arrived, is what the content hash covers.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::Provider;
use super::signature::razorpay_entity_id;
use crate::types::ContentHash;

/// Errors from normalization.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The payload was valid JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("failed to serialize normalized event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for normalization.
pub type Result<T> = std::result::Result<T, NormalizeError>;

/// A Stripe event reduced to its identity, type, creation time and object.
///
/// Fields absent from the payload are omitted rather than serialized as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StripeEvent {
    pub provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<Value>,
    pub data: Value,
}

/// A Razorpay event reduced to its entity id, event name, creation time and
/// entity payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RazorpayEvent {
    pub provider: Provider,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedEvent {
    Stripe(StripeEvent),
    Razorpay(RazorpayEvent),
}

impl NormalizedEvent {
    /// Normalizes a parsed payload from `provider`.
    pub fn from_payload(provider: Provider, payload: &Value) -> Result<Self> {
        let object = payload.as_object().ok_or(NormalizeError::NotAnObject)?;
        let field = |name: &str| object.get(name).cloned();

        Ok(match provider {
            Provider::Stripe => NormalizedEvent::Stripe(StripeEvent {
                provider,
                id: field("id"),
                event_type: field("type"),
                created: field("created"),
                data: present_or_empty(payload.pointer("/data/object")),
            }),
            Provider::Razorpay => NormalizedEvent::Razorpay(RazorpayEvent {
                provider,
                id: razorpay_entity_id(payload).unwrap_or_default().to_string(),
                event: field("event"),
                created_at: field("created_at"),
                data: present_or_empty(object.get("payload")),
            }),
        })
    }

    pub fn provider(&self) -> Provider {
        match self {
            NormalizedEvent::Stripe(e) => e.provider,
            NormalizedEvent::Razorpay(e) => e.provider,
        }
    }

    /// Compact JSON serialization; the exact bytes the content hash covers.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// SHA-256 of [`NormalizedEvent::to_json`].
    pub fn content_hash(&self) -> Result<ContentHash> {
        let json = self.to_json()?;
        Ok(ContentHash::from_digest(&Sha256::digest(json.as_bytes())))
    }
}

/// `value`, or `{}` when it is missing or null.
fn present_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(v) => v.clone(),
    }
}
