//! # API Route Modules
//!
//! - `facts`: observation ingestion, latest value, window and snapshot reads.
//! - `events`: trigger submission (queued on the bus or handled inline) and
//!   bus delivery status.
//! - `approvals`: pending gates and approve/reject decisions.
//! - `actions`: the dispatch ledger (failed, deferred, by id) and the audit
//!   trail.
//! - `catalog`: loaded rules and registered products.

pub mod actions;
pub mod approvals;
pub mod catalog;
pub mod events;
pub mod facts;
