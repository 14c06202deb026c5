//! # Approval Gates
//!
//! A gate holds a high-impact action until a human decides. Gates move
//! `pending → approved` or `pending → rejected` exactly once; a decided gate
//! is terminal. Rejection discards the queued action in the same critical
//! section that changes the status, so a rejected action can never be
//! handed to a target.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vos_core::{Action, ActionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub action_id: ActionId,
    pub status: GateStatus,
    pub approver: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub opened_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("no approval gate for action {0}")]
    NotFound(ActionId),

    #[error("approval gate for action {action_id} is already {status}")]
    AlreadyDecided {
        action_id: ActionId,
        status: GateStatus,
    },
}

struct GateEntry {
    gate: ApprovalGate,
    /// The queued action; `None` once rejected.
    action: Option<Action>,
}

#[derive(Default)]
pub struct ApprovalGates {
    entries: Mutex<HashMap<ActionId, GateEntry>>,
}

impl std::fmt::Debug for ApprovalGates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGates")
            .field("gates", &self.entries.lock().len())
            .finish()
    }
}

impl ApprovalGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a pending gate for `action`, or return the existing gate.
    pub fn open(&self, action: &Action) -> ApprovalGate {
        let mut entries = self.entries.lock();
        let entry = entries.entry(action.action_id).or_insert_with(|| GateEntry {
            gate: ApprovalGate {
                action_id: action.action_id,
                status: GateStatus::Pending,
                approver: None,
                decided_at: None,
                reason: None,
                opened_at: Utc::now(),
            },
            action: Some(action.clone()),
        });
        entry.gate.clone()
    }

    /// Approve a pending gate. Returns the gate and the queued action.
    pub fn approve(
        &self,
        action_id: ActionId,
        approver: &str,
    ) -> Result<(ApprovalGate, Action), GateError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&action_id)
            .ok_or(GateError::NotFound(action_id))?;
        let action = match (&entry.gate.status, &entry.action) {
            (GateStatus::Pending, Some(action)) => action.clone(),
            (status, _) => {
                return Err(GateError::AlreadyDecided {
                    action_id,
                    status: *status,
                })
            }
        };
        entry.gate.status = GateStatus::Approved;
        entry.gate.approver = Some(approver.to_string());
        entry.gate.decided_at = Some(Utc::now());
        Ok((entry.gate.clone(), action))
    }

    /// Reject a pending gate and discard its action.
    pub fn reject(
        &self,
        action_id: ActionId,
        approver: &str,
        reason: Option<String>,
    ) -> Result<ApprovalGate, GateError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&action_id)
            .ok_or(GateError::NotFound(action_id))?;
        if entry.gate.status.is_decided() {
            return Err(GateError::AlreadyDecided {
                action_id,
                status: entry.gate.status,
            });
        }
        entry.gate.status = GateStatus::Rejected;
        entry.gate.approver = Some(approver.to_string());
        entry.gate.decided_at = Some(Utc::now());
        entry.gate.reason = reason;
        entry.action = None;
        Ok(entry.gate.clone())
    }

    pub fn get(&self, action_id: ActionId) -> Option<ApprovalGate> {
        self.entries.lock().get(&action_id).map(|e| e.gate.clone())
    }

    /// The queued action, if the gate exists and was not rejected.
    pub fn action(&self, action_id: ActionId) -> Option<Action> {
        self.entries
            .lock()
            .get(&action_id)
            .and_then(|e| e.action.clone())
    }

    /// Pending gates with their actions, oldest first.
    pub fn pending(&self) -> Vec<(ApprovalGate, Action)> {
        let mut pending: Vec<(ApprovalGate, Action)> = self
            .entries
            .lock()
            .values()
            .filter(|e| e.gate.status == GateStatus::Pending)
            .filter_map(|e| e.action.clone().map(|a| (e.gate.clone(), a)))
            .collect();
        pending.sort_by(|a, b| {
            a.0.opened_at
                .cmp(&b.0.opened_at)
                .then_with(|| a.0.action_id.cmp(&b.0.action_id))
        });
        pending
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
