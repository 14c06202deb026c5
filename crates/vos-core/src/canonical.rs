//! # Canonical Serialization
//!
//! [`CanonicalBytes`] is the only construction path for bytes used in digest
//! computation (audit entries, fact-log hash chain).
//!
//! ## Coercion Rules
//!
//! 1. Reject floats; amounts must be strings or integers.
//! 2. Normalize RFC 3339 datetimes to UTC with `Z` suffix, truncated to seconds.
//! 3. Sort object keys lexicographically.
//! 4. Use compact separators (no whitespace).

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by canonicalization.
///
/// The inner `Vec<u8>` is private; the only constructor is
/// [`CanonicalBytes::new()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        let coerced = coerce_json_value(value)?;
        Ok(Self(serde_json::to_vec(&coerced)?))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn coerce_json_value(value: Value) -> Result<Value, CanonicalizationError> {
    match value {
        Value::Number(n) => {
            if n.is_f64() {
                return Err(CanonicalizationError::FloatRejected(
                    n.as_f64().unwrap_or(f64::NAN),
                ));
            }
            Ok(Value::Number(n))
        }
        Value::Object(map) => {
            // Rebuilt through a BTreeMap so key order is lexicographic
            // regardless of serde_json's map backing.
            let sorted: std::collections::BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| coerce_json_value(v).map(|v| (k, v)))
                .collect::<Result<_, _>>()?;
            Ok(Value::Object(sorted.into_iter().collect()))
        }
        Value::Array(arr) => Ok(Value::Array(
            arr.into_iter()
                .map(coerce_json_value)
                .collect::<Result<_, _>>()?,
        )),
        Value::String(s) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&s) {
                let utc = dt.with_timezone(&chrono::Utc);
                Ok(Value::String(utc.format("%Y-%m-%dT%H:%M:%SZ").to_string()))
            } else {
                Ok(Value::String(s))
            }
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_and_compact() {
        let cb = CanonicalBytes::new(&json!({"b": 1, "a": {"d": true, "c": null}})).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"a":{"c":null,"d":true},"b":1}"#
        );
    }

    #[test]
    fn floats_rejected() {
        assert!(matches!(
            CanonicalBytes::new(&json!({"amount": 1.5})),
            Err(CanonicalizationError::FloatRejected(_))
        ));
    }

    #[test]
    fn datetimes_normalized_to_utc_seconds() {
        let cb = CanonicalBytes::new(&json!({"t": "2026-03-01T10:00:00.123+01:00"})).unwrap();
        assert_eq!(
            std::str::from_utf8(cb.as_bytes()).unwrap(),
            r#"{"t":"2026-03-01T09:00:00Z"}"#
        );
    }
}
