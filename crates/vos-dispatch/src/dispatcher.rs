//! # Action Dispatcher
//!
//! Turns engine-emitted actions into calls on external targets.
//!
//! ```text
//!   dispatch(action)
//!     ├─ already decided in ledger ──────────────▶ recorded result
//!     ├─ requires approval, gate missing/pending ─▶ Deferred (gate opened)
//!     ├─ requires approval, gate rejected ───────▶ Failed{gate_rejected}
//!     └─ authorized ─▶ target.perform, retried on transient errors
//!                        ├─ ok ─────────────────▶ Succeeded{attempts}
//!                        ├─ permanent error ────▶ Failed{permanent}
//!                        └─ retries exhausted ──▶ Failed{retries_exhausted}
//! ```
//!
//! Every action that is not dispatched is deferred behind a pending gate,
//! failed with a reason, or still in flight, and stays visible through
//! [`ActionDispatcher::record`], [`ActionDispatcher::deferred`],
//! [`ActionDispatcher::failures`] and [`ActionDispatcher::in_flight`]. A
//! dispatch whose caller was cancelled stays in flight until the action is
//! dispatched again.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::OnceCell;
use vos_core::{Action, ActionId, AuditEntry, AuditEntryType, AuditTrail, TargetSystem};

use crate::gate::{ApprovalGate, ApprovalGates, GateError, GateStatus};
use crate::retry::RetryPolicy;
use crate::target::{ActionTarget, AuthorizedAction, LogTarget, TargetError};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Why an action was not dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum FailureReason {
    /// Transient failures persisted through every attempt.
    RetriesExhausted { attempts: u32, last_error: String },
    /// The target refused the action.
    Permanent { attempts: u32, error: String },
    /// A human rejected the approval gate.
    GateRejected {
        approver: Option<String>,
        reason: Option<String>,
    },
    /// No target is registered for the action's system.
    NoTarget { system: TargetSystem },
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Permanent { .. } => "permanent",
            Self::GateRejected { .. } => "gate_rejected",
            Self::NoTarget { .. } => "no_target",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "retries exhausted after {attempts} attempts: {last_error}"),
            Self::Permanent { error, .. } => write!(f, "target rejected action: {error}"),
            Self::GateRejected { approver, reason } => write!(
                f,
                "approval rejected by {}{}",
                approver.as_deref().unwrap_or("unknown"),
                reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
            ),
            Self::NoTarget { system } => write!(f, "no target registered for {system}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchResult {
    Succeeded { attempts: u32 },
    /// Awaiting a human decision. Not an error.
    Deferred { gate: ApprovalGate },
    Failed { reason: FailureReason },
}

impl DispatchResult {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Everything known about one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRecord {
    pub action: Action,
    /// `None` while the first dispatch is still in flight.
    pub result: Option<DispatchResult>,
    pub first_seen: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct LedgerEntry {
    action: Action,
    first_seen: DateTime<Utc>,
    /// Set once, when the action is performed or its gate is rejected.
    outcome: Arc<OnceCell<DispatchResult>>,
}

pub struct ActionDispatcher {
    targets: HashMap<TargetSystem, Arc<dyn ActionTarget>>,
    gates: Arc<ApprovalGates>,
    policy: RetryPolicy,
    ledger: Mutex<HashMap<ActionId, LedgerEntry>>,
    audit: Mutex<AuditTrail>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets: HashMap<&str, &str> = self
            .targets
            .iter()
            .map(|(system, target)| (system.as_str(), target.name()))
            .collect();
        f.debug_struct("ActionDispatcher")
            .field("targets", &targets)
            .field("policy", &self.policy)
            .field("ledger", &self.ledger.lock().len())
            .finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    /// A dispatcher with no targets. Actions for unregistered systems fail
    /// with [`FailureReason::NoTarget`].
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            targets: HashMap::new(),
            gates: Arc::new(ApprovalGates::new()),
            policy,
            ledger: Mutex::new(HashMap::new()),
            audit: Mutex::new(AuditTrail::default()),
        }
    }

    /// A [`LogTarget`] for every system.
    pub fn with_log_targets(mut self) -> Self {
        for system in TargetSystem::all() {
            self.targets
                .insert(system, Arc::new(LogTarget::new(system.as_str())));
        }
        self
    }

    pub fn with_target(mut self, system: TargetSystem, target: Arc<dyn ActionTarget>) -> Self {
        self.targets.insert(system, target);
        self
    }

    pub fn with_gates(mut self, gates: Arc<ApprovalGates>) -> Self {
        self.gates = gates;
        self
    }

    pub fn with_audit_capacity(self, capacity: usize) -> Self {
        *self.audit.lock() = AuditTrail::new(capacity);
        self
    }

    pub fn gates(&self) -> &Arc<ApprovalGates> {
        &self.gates
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dispatch an action. Safe to call repeatedly with the same action: a
    /// decided action returns its recorded result without calling the target
    /// again, and concurrent calls share one execution.
    pub async fn dispatch(&self, action: Action) -> DispatchResult {
        let outcome = self.ledger_entry(&action);
        if let Some(done) = outcome.get() {
            return done.clone();
        }

        let approved_by = if action.requires_approval {
            match self.gate_check(&action) {
                Ok(approver) => Some(approver),
                Err(result) => return result,
            }
        } else {
            None
        };

        let authorized = AuthorizedAction::new(action, approved_by);
        outcome
            .get_or_init(|| self.execute(authorized))
            .await
            .clone()
    }

    /// Approve a pending gate and dispatch its action.
    pub async fn approve(&self, action_id: ActionId, approver: &str) -> Result<DispatchResult, GateError> {
        let (gate, action) = self.gates.approve(action_id, approver)?;
        tracing::info!(action_id = %action_id, approver, "approval gate approved");
        self.audit(
            AuditEntryType::GateApproved,
            &action,
            json!({ "action_id": action_id, "approver": gate.approver }),
        );
        Ok(self.dispatch(action).await)
    }

    /// Reject a pending gate. The queued action is discarded and recorded as
    /// failed with [`FailureReason::GateRejected`].
    pub fn reject(
        &self,
        action_id: ActionId,
        approver: &str,
        reason: Option<String>,
    ) -> Result<DispatchResult, GateError> {
        let action = self.gates.action(action_id);
        let gate = self.gates.reject(action_id, approver, reason)?;
        let result = DispatchResult::Failed {
            reason: FailureReason::GateRejected {
                approver: gate.approver.clone(),
                reason: gate.reason.clone(),
            },
        };
        tracing::info!(action_id = %action_id, approver, "approval gate rejected");

        if let Some(action) = action {
            let outcome = self.ledger_entry(&action);
            // A rejected gate was pending, so nothing has been performed.
            if let Err(e) = outcome.set(result.clone()) {
                tracing::error!(
                    action_id = %action_id,
                    error = %e,
                    "rejected action already had a dispatch outcome"
                );
            }
            self.audit(
                AuditEntryType::GateRejected,
                &action,
                json!({ "action_id": action_id, "approver": gate.approver, "reason": gate.reason }),
            );
        }
        Ok(result)
    }

    pub fn record(&self, action_id: ActionId) -> Option<DispatchRecord> {
        let ledger = self.ledger.lock();
        ledger.get(&action_id).map(|entry| self.to_record(entry))
    }

    /// Actions that will not be dispatched, oldest first.
    pub fn failures(&self) -> Vec<DispatchRecord> {
        self.records_where(|result| matches!(result, Some(DispatchResult::Failed { .. })))
    }

    /// Actions waiting on a pending gate, oldest first.
    pub fn deferred(&self) -> Vec<DispatchRecord> {
        self.records_where(|result| matches!(result, Some(DispatchResult::Deferred { .. })))
    }

    /// Actions with no outcome yet and no pending gate: being performed, or
    /// abandoned by a cancelled caller and awaiting redelivery.
    pub fn in_flight(&self) -> Vec<DispatchRecord> {
        self.records_where(Option::is_none)
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().entries().to_vec()
    }

    // -- internals ----------------------------------------------------------

    fn ledger_entry(&self, action: &Action) -> Arc<OnceCell<DispatchResult>> {
        let mut ledger = self.ledger.lock();
        let entry = ledger.entry(action.action_id).or_insert_with(|| LedgerEntry {
            action: action.clone(),
            first_seen: Utc::now(),
            outcome: Arc::new(OnceCell::new()),
        });
        Arc::clone(&entry.outcome)
    }

    /// `Ok(approver)` if the gate is approved; otherwise the result to return.
    fn gate_check(&self, action: &Action) -> Result<String, DispatchResult> {
        match self.gates.get(action.action_id) {
            Some(ApprovalGate {
                status: GateStatus::Approved,
                approver,
                ..
            }) => Ok(approver.unwrap_or_default()),
            Some(gate @ ApprovalGate {
                status: GateStatus::Pending,
                ..
            }) => Err(DispatchResult::Deferred { gate }),
            Some(ApprovalGate {
                status: GateStatus::Rejected,
                approver,
                reason,
                ..
            }) => Err(DispatchResult::Failed {
                reason: FailureReason::GateRejected { approver, reason },
            }),
            None => {
                let gate = self.gates.open(action);
                tracing::info!(
                    action_id = %action.action_id,
                    kind = %action.kind,
                    product_id = %action.product_id,
                    rule_id = %action.origin_rule_id,
                    "action deferred pending approval"
                );
                self.audit(
                    AuditEntryType::ActionDeferred,
                    action,
                    json!({ "action_id": action.action_id, "kind": action.kind }),
                );
                Err(DispatchResult::Deferred { gate })
            }
        }
    }

    async fn execute(&self, authorized: AuthorizedAction) -> DispatchResult {
        let action = authorized.action();
        let system = action.target_system();
        let Some(target) = self.targets.get(&system) else {
            return self.fail(action, FailureReason::NoTarget { system });
        };

        let max_attempts = self.policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match target.perform(&authorized).await {
                Ok(()) => {
                    tracing::info!(
                        action_id = %action.action_id,
                        kind = %action.kind,
                        target_name = target.name(),
                        attempts = attempt,
                        "action dispatched"
                    );
                    self.audit(
                        AuditEntryType::ActionDispatched,
                        action,
                        json!({
                            "action_id": action.action_id,
                            "target": target.name(),
                            "attempts": attempt,
                            "approved_by": authorized.approved_by(),
                        }),
                    );
                    return DispatchResult::Succeeded { attempts: attempt };
                }
                Err(TargetError::Rejected(error)) => {
                    return self.fail(action, FailureReason::Permanent { attempts: attempt, error });
                }
                Err(error) if attempt >= max_attempts => {
                    return self.fail(
                        action,
                        FailureReason::RetriesExhausted {
                            attempts: attempt,
                            last_error: error.to_string(),
                        },
                    );
                }
                Err(error) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        action_id = %action.action_id,
                        target_name = target.name(),
                        attempt,
                        max_attempts,
                        "action target failed, retrying in {delay:?}: {error}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn fail(&self, action: &Action, reason: FailureReason) -> DispatchResult {
        tracing::error!(
            action_id = %action.action_id,
            kind = %action.kind,
            product_id = %action.product_id,
            code = reason.code(),
            "action failed: {reason}"
        );
        self.audit(
            AuditEntryType::ActionFailed,
            action,
            json!({ "action_id": action.action_id, "reason": reason }),
        );
        DispatchResult::Failed { reason }
    }

    fn audit(&self, entry_type: AuditEntryType, action: &Action, metadata: serde_json::Value) {
        self.audit
            .lock()
            .record(entry_type, Some(action.product_id.as_str()), metadata);
    }

    fn to_record(&self, entry: &LedgerEntry) -> DispatchRecord {
        let result = entry.outcome.get().cloned().or_else(|| {
            self.gates
                .get(entry.action.action_id)
                .filter(|gate| gate.status == GateStatus::Pending)
                .map(|gate| DispatchResult::Deferred { gate })
        });
        DispatchRecord {
            action: entry.action.clone(),
            result,
            first_seen: entry.first_seen,
        }
    }

    fn records_where(&self, keep: impl Fn(&Option<DispatchResult>) -> bool) -> Vec<DispatchRecord> {
        let mut records: Vec<DispatchRecord> = self
            .ledger
            .lock()
            .values()
            .map(|entry| self.to_record(entry))
            .filter(|record| keep(&record.result))
            .collect();
        records.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.action.action_id.cmp(&b.action.action_id))
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::tests::action;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vos_core::ActionKind;

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct Scripted {
        calls: AtomicU32,
        failures: u32,
        error: TargetError,
        seen: Mutex<Vec<AuthorizedAction>>,
    }

    impl Scripted {
        fn new(failures: u32, error: TargetError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
                error,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionTarget for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn perform(&self, action: &AuthorizedAction) -> Result<(), TargetError> {
            self.seen.lock().push(action.clone());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    fn dispatcher(system: TargetSystem, target: Arc<Scripted>) -> ActionDispatcher {
        ActionDispatcher::new(fast()).with_target(system, target)
    }

    #[tokio::test]
    async fn ungated_action_succeeds() {
        let target = Scripted::new(0, TargetError::Timeout("t".into()));
        let d = dispatcher(TargetSystem::AdPlatform, target.clone());
        let result = d.dispatch(action(ActionKind::Pause)).await;
        assert_eq!(result, DispatchResult::Succeeded { attempts: 1 });
        assert_eq!(target.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let target = Scripted::new(2, TargetError::RateLimited("429".into()));
        let d = dispatcher(TargetSystem::AdPlatform, target.clone());
        let result = d.dispatch(action(ActionKind::Pause)).await;
        assert_eq!(result, DispatchResult::Succeeded { attempts: 3 });
    }

    #[tokio::test]
    async fn repeated_timeouts_exhaust_retries() {
        let target = Scripted::new(u32::MAX, TargetError::Timeout("30s".into()));
        let d = dispatcher(TargetSystem::Deployment, target.clone());
        let rollback = action(ActionKind::Rollback);

        assert!(d.dispatch(rollback.clone()).await.is_deferred());
        let result = d.approve(rollback.action_id, "ops").await.unwrap();

        let reason = result.failure().unwrap();
        assert_eq!(reason.code(), "retries_exhausted");
        assert!(matches!(reason, FailureReason::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(target.calls(), 3);
        assert_eq!(d.failures().len(), 1);
        assert_eq!(d.failures()[0].action.action_id, rollback.action_id);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let target = Scripted::new(u32::MAX, TargetError::Rejected("400".into()));
        let d = dispatcher(TargetSystem::AdPlatform, target.clone());
        let result = d.dispatch(action(ActionKind::Pause)).await;
        assert_eq!(result.failure().map(FailureReason::code), Some("permanent"));
        assert_eq!(target.calls(), 1);
    }

    #[tokio::test]
    async fn gated_action_never_reaches_target_before_approval() {
        let target = Scripted::new(0, TargetError::Timeout("t".into()));
        let d = dispatcher(TargetSystem::AdPlatform, target.clone());
        let scale = action(ActionKind::Scale20Pct);
        assert!(scale.requires_approval);

        assert!(d.dispatch(scale.clone()).await.is_deferred());
        assert!(d.dispatch(scale.clone()).await.is_deferred());
        assert_eq!(target.calls(), 0);
        assert_eq!(d.deferred().len(), 1);
        assert_eq!(d.gates().pending().len(), 1);

        let result = d.approve(scale.action_id, "growth-lead").await.unwrap();
        assert!(result.is_succeeded());
        let seen = target.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].approved_by(), Some("growth-lead"));
        assert!(d.deferred().is_empty());
    }

    #[tokio::test]
    async fn rejection_discards_and_records_failure() {
        let target = Scripted::new(0, TargetError::Timeout("t".into()));
        let d = dispatcher(TargetSystem::Deployment, target.clone());
        let rollback = action(ActionKind::Rollback);
        d.dispatch(rollback.clone()).await;

        let result = d
            .reject(rollback.action_id, "cto", Some("false alarm".into()))
            .unwrap();
        assert_eq!(result.failure().map(FailureReason::code), Some("gate_rejected"));

        // Redelivery of the same action stays rejected and never reaches the target.
        assert_eq!(d.dispatch(rollback.clone()).await, result);
        assert_eq!(target.calls(), 0);
        assert!(d.approve(rollback.action_id, "cto").await.is_err());
        assert_eq!(
            d.record(rollback.action_id).unwrap().result,
            Some(result.clone())
        );
        let failures = d.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].result, Some(result));
        assert!(d.in_flight().is_empty());
    }

    #[tokio::test]
    async fn decided_actions_are_not_redispatched() {
        let target = Scripted::new(0, TargetError::Timeout("t".into()));
        let d = dispatcher(TargetSystem::AdPlatform, target.clone());
        let pause = action(ActionKind::Pause);
        let first = d.dispatch(pause.clone()).await;
        let second = d.dispatch(pause.clone()).await;
        assert_eq!(first, second);
        assert_eq!(target.calls(), 1);
    }

    /// Hangs on its first call; later calls succeed.
    #[derive(Default)]
    struct HangsOnce {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ActionTarget for HangsOnce {
        fn name(&self) -> &str {
            "hangs-once"
        }

        async fn perform(&self, _action: &AuthorizedAction) -> Result<(), TargetError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancelled_dispatch_stays_visible_until_redispatched() {
        let target = Arc::new(HangsOnce::default());
        let d = ActionDispatcher::new(fast()).with_target(TargetSystem::AdPlatform, target.clone());
        let pause = action(ActionKind::Pause);

        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(20), d.dispatch(pause.clone())).await;
        assert!(abandoned.is_err());
        assert!(d.failures().is_empty());
        assert!(d.deferred().is_empty());
        let in_flight = d.in_flight();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].action.action_id, pause.action_id);
        assert_eq!(in_flight[0].result, None);

        assert!(d.dispatch(pause).await.is_succeeded());
        assert!(d.in_flight().is_empty());
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_dispatch_performs_once() {
        let target = Scripted::new(0, TargetError::Timeout("t".into()));
        let d = Arc::new(dispatcher(TargetSystem::AdPlatform, target.clone()));
        let pause = action(ActionKind::Pause);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = Arc::clone(&d);
                let pause = pause.clone();
                tokio::spawn(async move { d.dispatch(pause).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_succeeded());
        }
        assert_eq!(target.calls(), 1);
    }

    #[tokio::test]
    async fn missing_target_fails_visibly() {
        let d = ActionDispatcher::new(fast());
        let result = d.dispatch(action(ActionKind::Alert)).await;
        assert_eq!(
            result.failure(),
            Some(&FailureReason::NoTarget {
                system: TargetSystem::Messaging
            })
        );
        assert_eq!(d.failures().len(), 1);
    }

    #[tokio::test]
    async fn audit_trail_covers_lifecycle() {
        let d = ActionDispatcher::new(fast()).with_log_targets();
        let rollback = action(ActionKind::Rollback);
        d.dispatch(rollback.clone()).await;
        d.approve(rollback.action_id, "ops").await.unwrap();
        let types: Vec<AuditEntryType> = d.audit_entries().iter().map(|e| e.entry_type).collect();
        assert_eq!(
            types,
            vec![
                AuditEntryType::ActionDeferred,
                AuditEntryType::GateApproved,
                AuditEntryType::ActionDispatched,
            ]
        );
    }

    #[test]
    fn results_serialize_with_status_and_code() {
        let failed = DispatchResult::Failed {
            reason: FailureReason::RetriesExhausted {
                attempts: 3,
                last_error: "timed out".into(),
            },
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"]["code"], "retries_exhausted");
        assert_eq!(json["reason"]["attempts"], 3);
    }
}
