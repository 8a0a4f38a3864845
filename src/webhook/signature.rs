/// Shared-secret SHA-256 signatures over webhook payloads
///
/// The digest input is the string form of every field except `signature`,
/// taken in lexicographic key order and concatenated, followed by the shared
/// secret. String values contribute their contents without quotes; numbers,
/// booleans and null contribute their JSON text exactly as sent. Senders must
/// therefore sign the same text they transmit: `"amount": "100.00"` and
/// `"amount": 100.0` are different payloads with different signatures.
use crate::error::{ApiError, ApiResult};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Field name carrying the digest
pub const SIGNATURE_FIELD: &str = "signature";

/// Top-level payload fields keyed in byte order, values as received
pub type WebhookFields = BTreeMap<String, Box<RawValue>>;

/// Split a request body into its top-level fields
pub fn parse_fields(body: &[u8]) -> ApiResult<WebhookFields> {
    serde_json::from_slice(body)
        .map_err(|_| ApiError::invalid_field("body", "Request body must be a JSON object"))
}

/// String form of one value, or `None` for nested objects and arrays
fn value_text(raw: &RawValue) -> Option<String> {
    let text = raw.get().trim();
    match text.as_bytes().first()? {
        b'"' => serde_json::from_str::<String>(text).ok(),
        b'{' | b'[' => None,
        _ => Some(text.to_string()),
    }
}

/// Signs and verifies payloads with one shared secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// The exact string that is hashed, or `None` if a value cannot be flattened
    pub fn canonical_string(&self, fields: &WebhookFields) -> Option<String> {
        let mut message = String::new();
        for (key, raw) in fields {
            if key == SIGNATURE_FIELD {
                continue;
            }
            message.push_str(&value_text(raw)?);
        }
        message.push_str(&self.secret);
        Some(message)
    }

    /// Lowercase hex SHA-256 digest of the canonical string
    pub fn sign(&self, fields: &WebhookFields) -> Option<String> {
        let message = self.canonical_string(fields)?;
        Some(hex::encode(Sha256::digest(message.as_bytes())))
    }

    /// Sign a JSON object value; convenience for senders and tests
    pub fn sign_value(&self, payload: &serde_json::Value) -> Option<String> {
        let fields: WebhookFields = serde_json::from_str(&payload.to_string()).ok()?;
        self.sign(&fields)
    }

    /// Recompute the digest and compare it to the `signature` field; fails closed
    pub fn verify(&self, fields: &WebhookFields) -> bool {
        let presented = match fields
            .get(SIGNATURE_FIELD)
            .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok())
        {
            Some(signature) => signature,
            None => return false,
        };

        match self.sign(fields) {
            Some(expected) => constant_time_eq(expected.as_bytes(), presented.as_bytes()),
            None => false,
        }
    }
}

/// Byte comparison whose running time does not depend on where inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
