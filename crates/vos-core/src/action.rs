//! # Actions
//!
//! An [`Action`] is the intent a fired rule emits: pause a campaign, scale a
//! budget, roll back a deployment, alert an operator. Actions are created by
//! the rules engine and consumed by the dispatcher; they are never mutated in
//! between.
//!
//! Each [`ActionKind`] maps to the [`TargetSystem`] that performs it and to a
//! [`ConflictClass`]. Two actions in the same conflict class for the same
//! product contradict each other, and only the higher-priority one survives a
//! trigger.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{ActionId, EventId, ProductId, RuleId};

/// The external system class that performs an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSystem {
    /// Advertising platforms (campaign pause/scale).
    AdPlatform,
    /// Deployment infrastructure (restart/rollback).
    Deployment,
    /// Operator and customer messaging (alerts, tickets, email).
    Messaging,
}

impl TargetSystem {
    /// All target systems.
    pub fn all() -> [TargetSystem; 3] {
        [Self::AdPlatform, Self::Deployment, Self::Messaging]
    }

    /// The configuration string for this system.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdPlatform => "ad_platform",
            Self::Deployment => "deployment",
            Self::Messaging => "messaging",
        }
    }
}

impl fmt::Display for TargetSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of action a rule emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Pause a campaign.
    Pause,
    /// Resume a paused campaign.
    Resume,
    /// Raise a campaign budget by 20%.
    #[serde(rename = "scale_20pct")]
    Scale20Pct,
    /// Raise a campaign budget by a parameterized percentage.
    ScaleUp,
    /// Lower a campaign budget.
    ScaleDown,
    /// Freeze campaign changes (e.g. during a learning phase).
    Hold,
    /// Raise an operator alert.
    Alert,
    /// Send an informational notification.
    Notify,
    /// Restart a running deployment.
    Restart,
    /// Roll a deployment back to its previous release.
    Rollback,
    /// Open a support ticket.
    CreateTicket,
    /// Send an email to a customer.
    SendEmail,
}

/// Actions that contradict each other when applied to the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictClass {
    /// Campaign state and budget changes (pause, resume, scale, hold).
    CampaignControl,
    /// Deployment release changes (restart, rollback).
    Release,
    /// Any other kind conflicts only with itself.
    Kind(ActionKind),
}

impl ActionKind {
    /// All action kinds.
    pub fn all() -> [ActionKind; 12] {
        [
            Self::Pause,
            Self::Resume,
            Self::Scale20Pct,
            Self::ScaleUp,
            Self::ScaleDown,
            Self::Hold,
            Self::Alert,
            Self::Notify,
            Self::Restart,
            Self::Rollback,
            Self::CreateTicket,
            Self::SendEmail,
        ]
    }

    /// The wire string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Scale20Pct => "scale_20pct",
            Self::ScaleUp => "scale_up",
            Self::ScaleDown => "scale_down",
            Self::Hold => "hold",
            Self::Alert => "alert",
            Self::Notify => "notify",
            Self::Restart => "restart",
            Self::Rollback => "rollback",
            Self::CreateTicket => "create_ticket",
            Self::SendEmail => "send_email",
        }
    }

    /// The system that performs actions of this kind.
    ///
    /// `hold` performs nothing on the ad platform itself; it is delivered as
    /// a message to the operators of the frozen campaign.
    pub fn target_system(&self) -> TargetSystem {
        match self {
            Self::Pause | Self::Resume | Self::Scale20Pct | Self::ScaleUp | Self::ScaleDown => {
                TargetSystem::AdPlatform
            }
            Self::Restart | Self::Rollback => TargetSystem::Deployment,
            Self::Hold | Self::Alert | Self::Notify | Self::CreateTicket | Self::SendEmail => {
                TargetSystem::Messaging
            }
        }
    }

    /// The conflict class used for per-trigger suppression.
    pub fn conflict_class(&self) -> ConflictClass {
        match self {
            Self::Pause
            | Self::Resume
            | Self::Scale20Pct
            | Self::ScaleUp
            | Self::ScaleDown
            | Self::Hold => ConflictClass::CampaignControl,
            Self::Restart | Self::Rollback => ConflictClass::Release,
            other => ConflictClass::Kind(*other),
        }
    }

    /// Whether actions of this kind require human approval unless the rule
    /// says otherwise. Spend increases, release changes and customer-facing
    /// email are high-impact.
    pub fn is_high_impact(&self) -> bool {
        matches!(
            self,
            Self::Scale20Pct | Self::ScaleUp | Self::Restart | Self::Rollback | Self::SendEmail
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "action kind",
                value: s.to_string(),
            })
    }
}

/// An action emitted by a fired rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Deterministic identifier (see [`ActionId::derive`]).
    pub action_id: ActionId,
    /// What to do.
    pub kind: ActionKind,
    /// The product the action applies to.
    pub product_id: ProductId,
    /// Target within the target system (campaign, deployment, channel).
    pub target: String,
    /// Kind-specific parameters (e.g. `increase_percent`, `reason`).
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Whether dispatch waits for an approval gate.
    pub requires_approval: bool,
    /// The rule that emitted the action.
    pub origin_rule_id: RuleId,
    /// Priority of the originating rule.
    pub priority: i32,
    /// The trigger that caused the evaluation.
    pub event_id: EventId,
    /// When the action was emitted.
    pub created_at: DateTime<Utc>,
}

impl Action {
    /// The system that performs this action.
    pub fn target_system(&self) -> TargetSystem {
        self.kind.target_system()
    }

    /// The key under which contradicting actions are suppressed. Only the
    /// highest-priority action per key is emitted, whatever its target.
    pub fn conflict_key(&self) -> (ProductId, ConflictClass) {
        (self.product_id.clone(), self.kind.conflict_class())
    }
}
