//! # vos-core — Records Shared by the Automation Core
//!
//! Identifiers, exact decimals, typed fact values, trigger events, actions
//! and the audit trail. No other workspace crate is a dependency.
//!
//! String identifiers ([`ProductId`], [`MetricName`], [`RuleId`]) validate on
//! construction and on deserialization, so a value that exists is well-formed.
//! Currency and ratio facts are [`Decimal`]s; floats are refused at every
//! boundary.
//!
//! Digests of audit entries and fact-log records are always computed over
//! [`CanonicalBytes`].

pub mod action;
pub mod audit;
pub mod canonical;
pub mod decimal;
pub mod digest;
pub mod error;
pub mod event;
pub mod identity;
pub mod value;

pub use action::{Action, ActionKind, ConflictClass, TargetSystem};
pub use audit::{AuditEntry, AuditEntryType, AuditTrail};
pub use canonical::CanonicalBytes;
pub use decimal::Decimal;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{CanonicalizationError, ValidationError};
pub use event::{event_types, TriggerEvent};
pub use identity::{ActionId, EventId, MetricName, ProductId, RuleId};
pub use value::{FactValue, ValueType};
