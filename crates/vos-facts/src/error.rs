//! Fact store errors.

use std::path::PathBuf;

use thiserror::Error;
use vos_core::{CanonicalizationError, MetricName, ProductId, ValidationError};

/// Errors raised by the fact schema, store and log.
#[derive(Error, Debug)]
pub enum FactError {
    /// The fact does not conform to the schema (unknown metric or wrong type).
    #[error("invalid fact {product_id}/{metric}: {reason}")]
    InvalidFact {
        product_id: ProductId,
        metric: MetricName,
        reason: String,
    },

    /// No fact has been recorded for the key.
    #[error("no fact recorded for {product_id}/{metric}")]
    NotFound {
        product_id: ProductId,
        metric: MetricName,
    },

    /// A persisted fact log failed hash-chain verification.
    #[error("fact log chain broken at sequence {sequence}: {reason}")]
    ChainBroken { sequence: u64, reason: String },

    /// The schema file could not be parsed.
    #[error("failed to parse schema YAML at {path}: {source}")]
    SchemaParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A referenced file does not exist.
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// A fact log line could not be decoded.
    #[error("malformed fact log record at line {line}: {source}")]
    MalformedRecord {
        line: usize,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for fact store operations.
pub type FactResult<T> = Result<T, FactError>;
