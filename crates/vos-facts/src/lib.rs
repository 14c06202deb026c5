//! # vos-facts — Fact Store
//!
//! The fact store is the system of record for observed metrics. Facts are
//! typed against a [`FactSchema`], appended (never updated in place) to a
//! per-(product, metric) series kept in timestamp order, and optionally
//! persisted to a hash-chained [`FactSink`] before they become visible.
//!
//! Readers see a consistent point-in-time view: each series is an immutable
//! `Arc<Vec<Fact>>` replaced wholesale on write, so a [`FactWindow`] or
//! [`FactSnapshot`] taken before a write never observes it half-applied.

pub mod error;
pub mod fact;
pub mod log;
pub mod schema;
pub mod store;

pub use error::{FactError, FactResult};
pub use fact::{Fact, FactKey};
pub use log::{verify_chain, FactRecord, FactSink, JsonlFactLog, MemoryFactLog};
pub use schema::{FactSchema, MetricSpec};
pub use store::{FactSnapshot, FactStore, FactWindow};
