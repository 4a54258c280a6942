use crate::error::{SocError, SocResult};
use crate::security_log::SecurityLogEntry;
use chrono::SecondsFormat;
use hmac::{Hmac, Mac};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Chain input for the first record and the final signature of an empty export
pub const GENESIS: &str = "genesis";

pub const MIN_SECRET_LENGTH: usize = 32;

/// Well-known secret used when none is configured outside production.
/// Exports signed with it prove nothing to a third party.
pub const INSECURE_FALLBACK_SECRET: &str = "scrapsoc-insecure-development-signing-secret";

/// HMAC-SHA256 signer for hash-chained log exports
#[derive(Clone)]
pub struct ChainSigner {
    key: Vec<u8>,
}

impl ChainSigner {
    pub fn new(secret: &str) -> SocResult<Self> {
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(SocError::configuration(format!(
                "Signing secret must be at least {} characters long",
                MIN_SECRET_LENGTH
            )));
        }

        Ok(Self {
            key: secret.as_bytes().to_vec(),
        })
    }

    pub fn insecure_fallback() -> Self {
        Self {
            key: INSECURE_FALLBACK_SECRET.as_bytes().to_vec(),
        }
    }

    /// Signature of `entry` chained onto `previous_signature`, hex encoded
    pub fn sign_link(&self, entry: &SecurityLogEntry, previous_signature: &str) -> SocResult<String> {
        self.sign(&canonical_payload(entry, previous_signature))
    }

    pub fn verify_link(
        &self,
        entry: &SecurityLogEntry,
        previous_signature: &str,
        signature: &str,
    ) -> SocResult<bool> {
        let expected = self.sign_link(entry, previous_signature)?;
        Ok(constant_time_eq::constant_time_eq(
            signature.as_bytes(),
            expected.as_bytes(),
        ))
    }

    fn sign(&self, message: &str) -> SocResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| SocError::configuration(format!("Failed to create HMAC: {}", e)))?;

        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl fmt::Debug for ChainSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Canonical chain input: compact JSON with lexicographically sorted keys,
/// absent fields as `null` and millisecond UTC timestamps.
///
/// The entry id is left out so a re-imported log verifies the same way.
pub fn canonical_payload(entry: &SecurityLogEntry, previous_signature: &str) -> String {
    let payload = json!({
        "level": entry.level,
        "event": entry.event,
        "userId": entry.user_id,
        "ip": entry.ip,
        "userAgent": entry.user_agent,
        "details": entry.details,
        "createdAt": entry.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        "previousSignature": previous_signature,
    });
    sorted(payload).to_string()
}

/// Rebuild objects with keys inserted in sorted order, whatever map ordering
/// serde_json was built with
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key, sorted(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}
