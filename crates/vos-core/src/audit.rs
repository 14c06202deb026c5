//! # Automation Audit Trail
//!
//! Records every trigger, rule evaluation, suppression, emission, approval
//! decision and dispatch outcome so an operator can reconstruct why an action
//! was (or was not) taken.
//!
//! Every entry is individually digestable via `CanonicalBytes` +
//! `sha256_digest`. The trail is append-only and bounded: when the configured
//! maximum is exceeded the oldest 10% of entries are trimmed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalBytes;
use crate::digest::{sha256_digest, ContentDigest};
use crate::error::CanonicalizationError;

// ---------------------------------------------------------------------------
// AuditEntryType
// ---------------------------------------------------------------------------

/// The type of audit trail event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntryType {
    /// A trigger was received by the rules engine.
    TriggerReceived,
    /// A redelivered trigger was answered from the deduplication cache.
    TriggerReplayed,
    /// A rule was evaluated against a fact snapshot.
    RuleEvaluated,
    /// A rule evaluation raised a fault.
    RuleFaulted,
    /// A fired rule's action was emitted.
    ActionEmitted,
    /// A fired rule's action lost to a higher-priority conflicting action.
    ActionSuppressed,
    /// An action was parked behind an approval gate.
    ActionDeferred,
    /// An action was performed by its target.
    ActionDispatched,
    /// An action failed permanently or exhausted its retries.
    ActionFailed,
    /// An approval gate was approved.
    GateApproved,
    /// An approval gate was rejected and its action discarded.
    GateRejected,
}

impl AuditEntryType {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TriggerReceived => "trigger_received",
            Self::TriggerReplayed => "trigger_replayed",
            Self::RuleEvaluated => "rule_evaluated",
            Self::RuleFaulted => "rule_faulted",
            Self::ActionEmitted => "action_emitted",
            Self::ActionSuppressed => "action_suppressed",
            Self::ActionDeferred => "action_deferred",
            Self::ActionDispatched => "action_dispatched",
            Self::ActionFailed => "action_failed",
            Self::GateApproved => "gate_approved",
            Self::GateRejected => "gate_rejected",
        }
    }
}

impl fmt::Display for AuditEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// A single entry in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// The type of audit event.
    pub entry_type: AuditEntryType,
    /// UTC timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Product the event concerns, if any.
    pub product_id: Option<String>,
    /// Structured metadata (rule id, action id, reason, ...).
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntry {
    /// Create a new audit entry with the current UTC timestamp.
    pub fn new(
        entry_type: AuditEntryType,
        product_id: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entry_type,
            timestamp: Utc::now(),
            product_id,
            metadata,
        }
    }

    /// Content digest of this entry.
    ///
    /// Fails if the metadata contains floats.
    pub fn digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }
}

impl PartialEq for AuditEntry {
    fn eq(&self, other: &Self) -> bool {
        self.entry_type == other.entry_type
            && self.product_id == other.product_id
            && self.metadata == other.metadata
    }
}

impl Eq for AuditEntry {}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

/// An append-only audit trail with a configurable capacity.
///
/// Not `Sync`; owners wrap it in a lock.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
    max_entries: usize,
}

impl AuditTrail {
    /// Create a new audit trail with the given maximum capacity.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// Append an entry, trimming the oldest 10% (at least one) on overflow.
    pub fn append(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            let trim_count = (self.max_entries / 10).max(1);
            let trim_count = trim_count.min(self.entries.len());
            self.entries.drain(..trim_count);
        }
    }

    /// Shorthand for appending a freshly timestamped entry.
    pub fn record(
        &mut self,
        entry_type: AuditEntryType,
        product_id: Option<&str>,
        metadata: serde_json::Value,
    ) {
        self.append(AuditEntry::new(
            entry_type,
            product_id.map(str::to_string),
            Some(metadata),
        ));
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the trail is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one product.
    pub fn entries_for_product(&self, product_id: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.product_id.as_deref() == Some(product_id))
            .collect()
    }

    /// Entries of one type.
    pub fn entries_by_type(&self, entry_type: AuditEntryType) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.entry_type == entry_type)
            .collect()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(10_000)
    }
}
