//! # Action Targets
//!
//! External collaborators (ad platforms, deployment systems, messaging)
//! consumed through [`ActionTarget::perform`]. Targets only ever receive an
//! [`AuthorizedAction`], which the dispatcher constructs after the approval
//! check; nothing outside this crate can build one.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use vos_core::Action;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The target refused the action; retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl TargetError {
    /// Rate limits, timeouts and unavailability are retried.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// An action cleared for dispatch: either it needs no approval, or its gate
/// was approved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizedAction {
    action: Action,
    approved_by: Option<String>,
}

impl AuthorizedAction {
    pub(crate) fn new(action: Action, approved_by: Option<String>) -> Self {
        Self {
            action,
            approved_by,
        }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Approver of the gate, for gated actions.
    pub fn approved_by(&self) -> Option<&str> {
        self.approved_by.as_deref()
    }
}

impl std::ops::Deref for AuthorizedAction {
    type Target = Action;

    fn deref(&self) -> &Action {
        &self.action
    }
}

#[async_trait]
pub trait ActionTarget: Send + Sync {
    fn name(&self) -> &str;

    async fn perform(&self, action: &AuthorizedAction) -> Result<(), TargetError>;
}

/// Logs and records every action it performs. The default target for every
/// system when no external collaborator is configured.
#[derive(Debug, Default)]
pub struct LogTarget {
    name: String,
    performed: Mutex<Vec<AuthorizedAction>>,
}

impl LogTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            performed: Mutex::new(Vec::new()),
        }
    }

    pub fn performed(&self) -> Vec<AuthorizedAction> {
        self.performed.lock().clone()
    }
}

#[async_trait]
impl ActionTarget for LogTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform(&self, action: &AuthorizedAction) -> Result<(), TargetError> {
        tracing::info!(
            target_name = %self.name,
            action_id = %action.action_id,
            kind = %action.kind,
            product_id = %action.product_id,
            action_target = %action.target,
            approved_by = action.approved_by().unwrap_or("-"),
            "action performed"
        );
        self.performed.lock().push(action.clone());
        Ok(())
    }
}
