//! Bus and handler errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("event from {source_name} at {timestamp} precedes last published event at {last}")]
    OutOfOrder {
        source_name: String,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("handler \"{0}\" is already subscribed")]
    DuplicateHandler(String),

    #[error("event bus is shut down")]
    ShutDown,
}

/// Failure reported by a handler for one delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Retry later; the event is redelivered.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying cannot help; the event is dead-lettered.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
