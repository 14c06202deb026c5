//! # vos-dispatch — Action Dispatcher
//!
//! Delivers actions emitted by the rules engine to the external systems that
//! perform them.
//!
//! - [`ActionDispatcher`]: routes each action to the [`ActionTarget`]
//!   registered for its [`TargetSystem`](vos_core::TargetSystem), retries
//!   transient failures per [`RetryPolicy`], and records every outcome in an
//!   idempotent ledger keyed by action id.
//! - [`ApprovalGates`]: high-impact actions are parked behind a gate and only
//!   reach a target after a human approves them. Rejection discards the
//!   action.
//! - [`WebhookTarget`]: an HTTP target that POSTs the action as JSON.

pub mod dispatcher;
pub mod gate;
pub mod retry;
pub mod target;
pub mod webhook;

pub use dispatcher::{ActionDispatcher, DispatchRecord, DispatchResult, FailureReason};
pub use gate::{ApprovalGate, ApprovalGates, GateError, GateStatus};
pub use retry::RetryPolicy;
pub use target::{ActionTarget, AuthorizedAction, LogTarget, TargetError};
pub use webhook::{WebhookConfig, WebhookConfigError, WebhookTarget};
