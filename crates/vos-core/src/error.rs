//! # Error Types
//!
//! Validation and canonicalization errors shared by every crate in the
//! workspace. Subsystem crates wrap these in their own `thiserror` enums.

use thiserror::Error;

/// Validation errors for domain primitive newtypes and exact decimals.
///
/// Each variant carries the rejected input so that a misconfigured rule file
/// or a malformed ingestion request can be diagnosed from the message alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Product identifier is not a lowercase slug.
    #[error("invalid product ID: \"{0}\" (expected 1-64 chars of [a-z0-9_-], starting with a letter or digit)")]
    InvalidProductId(String),

    /// Metric name is not snake_case.
    #[error("invalid metric name: \"{0}\" (expected [a-z][a-z0-9_]*, at most 64 chars)")]
    InvalidMetricName(String),

    /// Rule identifier is empty or contains whitespace.
    #[error("invalid rule ID: \"{0}\" (expected 1-128 non-whitespace chars)")]
    InvalidRuleId(String),

    /// A UUID-based identifier failed to parse.
    #[error("invalid {kind}: \"{value}\" (expected a UUID)")]
    InvalidUuid {
        /// Which identifier was being parsed.
        kind: &'static str,
        /// The string that failed to parse.
        value: String,
    },

    /// A decimal literal failed to parse.
    #[error("invalid decimal: \"{value}\" ({reason})")]
    InvalidDecimal {
        /// The string that failed to parse.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A digest string is not 64 hex characters.
    #[error("invalid digest: \"{0}\" (expected 64 hex characters)")]
    InvalidDigest(String),

    /// An enum-like string did not name a known variant.
    #[error("unknown {kind}: \"{value}\"")]
    UnknownVariant {
        /// The enum being parsed.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Amounts must be strings or integers.
    #[error("float values are not permitted in canonical representations; use string or integer for amounts: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed during canonicalization.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
