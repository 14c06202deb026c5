//! # Rules Engine
//!
//! Evaluates the active rule set against a product's current facts when a
//! trigger arrives.
//!
//! ## Ordering and Suppression
//!
//! Candidate rules are those enabled, in scope for the product and
//! listening to the event type. They are evaluated in rule-set order
//! (priority descending, id ascending). The first fired action for a
//! conflict key `(product, conflict class)` wins; later ones are
//! suppressed, not queued.
//!
//! ## Fault Isolation
//!
//! An [`EvaluationFault`] is logged, audited and reported in the outcome.
//! Remaining rules are still evaluated.
//!
//! ## Idempotence
//!
//! Outcomes are cached by `(event id, product)` in a bounded FIFO. A
//! redelivered trigger returns the cached outcome with `replayed = true`;
//! callers must not dispatch replayed actions again.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use vos_core::{
    Action, ActionId, AuditEntry, AuditEntryType, AuditTrail, ConflictClass, EventId, ProductId,
    TriggerEvent,
};
use vos_facts::{FactSnapshot, FactStore};

use crate::error::EvaluationFault;
use crate::evaluation::evaluate;
use crate::ruleset::RuleSet;

/// Default number of `(event, product)` outcomes remembered for dedup.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Default audit trail capacity.
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A fired action that lost to a higher-priority action with the same
/// conflict key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suppression {
    pub action: Action,
    pub superseded_by: ActionId,
}

/// Result of processing one trigger for one product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerOutcome {
    pub event_id: EventId,
    pub product_id: ProductId,
    /// Emitted actions in evaluation order.
    pub actions: Vec<Action>,
    pub suppressed: Vec<Suppression>,
    pub faults: Vec<EvaluationFault>,
    /// Number of candidate rules evaluated.
    pub evaluated: usize,
    /// The trigger was already processed; `actions` repeats the original.
    pub replayed: bool,
}

impl TriggerOutcome {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dedup cache
// ---------------------------------------------------------------------------

type TriggerKey = (EventId, ProductId);

#[derive(Debug)]
struct ProcessedTriggers {
    capacity: usize,
    order: VecDeque<TriggerKey>,
    outcomes: HashMap<TriggerKey, TriggerOutcome>,
}

impl ProcessedTriggers {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            outcomes: HashMap::new(),
        }
    }

    fn get(&self, key: &TriggerKey) -> Option<&TriggerOutcome> {
        self.outcomes.get(key)
    }

    /// Insert unless present; returns the outcome now cached for the key.
    fn insert(&mut self, key: TriggerKey, outcome: TriggerOutcome) -> Option<TriggerOutcome> {
        if let Some(existing) = self.outcomes.get(&key) {
            return Some(existing.clone());
        }
        if self.capacity == 0 {
            return None;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.outcomes.insert(key, outcome);
        None
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RulesEngine {
    rules: RwLock<Arc<RuleSet>>,
    facts: FactStore,
    processed: Mutex<ProcessedTriggers>,
    audit: Mutex<AuditTrail>,
}

impl std::fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulesEngine")
            .field("rules", &self.rules.read().len())
            .field("facts", &self.facts)
            .finish_non_exhaustive()
    }
}

impl RulesEngine {
    pub fn new(rules: RuleSet, facts: FactStore) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
            facts,
            processed: Mutex::new(ProcessedTriggers::new(DEFAULT_DEDUP_CAPACITY)),
            audit: Mutex::new(AuditTrail::new(DEFAULT_AUDIT_CAPACITY)),
        }
    }

    /// Capacity 0 disables deduplication.
    pub fn with_dedup_capacity(self, capacity: usize) -> Self {
        *self.processed.lock() = ProcessedTriggers::new(capacity);
        self
    }

    pub fn with_audit_capacity(self, capacity: usize) -> Self {
        *self.audit.lock() = AuditTrail::new(capacity);
        self
    }

    /// The active rule set.
    pub fn rules(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules.read())
    }

    /// Atomically replace the active rule set. Evaluations already in
    /// progress finish against the set they started with.
    pub fn reload(&self, rules: RuleSet) {
        let count = rules.len();
        *self.rules.write() = Arc::new(rules);
        tracing::info!(rules = count, "rule set reloaded");
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().entries().to_vec()
    }

    /// Process a trigger for one product against the store's current facts.
    pub fn on_trigger(&self, event: &TriggerEvent, product_id: &ProductId) -> TriggerOutcome {
        let key = (event.event_id, product_id.clone());
        if let Some(cached) = self.processed.lock().get(&key).cloned() {
            return self.replay(cached);
        }

        let snapshot = self.facts.snapshot(product_id);
        let outcome = self.evaluate_snapshot(event, &snapshot);

        match self.processed.lock().insert(key, outcome.clone()) {
            Some(earlier) => self.replay(earlier),
            None => outcome,
        }
    }

    /// Evaluate against an explicit snapshot without consulting or updating
    /// the dedup cache.
    pub fn evaluate_snapshot(&self, event: &TriggerEvent, snapshot: &FactSnapshot) -> TriggerOutcome {
        let rules = self.rules();
        let product_id = snapshot.product_id();
        let product = product_id.as_str();

        let mut audit = Vec::new();
        audit.push((
            AuditEntryType::TriggerReceived,
            json!({
                "event_id": event.event_id,
                "event_type": event.event_type,
                "source": event.source,
            }),
        ));

        let mut outcome = TriggerOutcome {
            event_id: event.event_id,
            product_id: product_id.clone(),
            actions: Vec::new(),
            suppressed: Vec::new(),
            faults: Vec::new(),
            evaluated: 0,
            replayed: false,
        };
        let mut winners: HashMap<(ProductId, ConflictClass), ActionId> = HashMap::new();

        for rule in rules.for_trigger(product_id, &event.event_type) {
            outcome.evaluated += 1;
            let result = match evaluate(rule, snapshot, event) {
                Ok(result) => result,
                Err(fault) => {
                    tracing::warn!(
                        product_id = %product_id,
                        rule_id = %fault.rule_id,
                        error = %fault.source,
                        "rule evaluation faulted"
                    );
                    audit.push((
                        AuditEntryType::RuleFaulted,
                        json!({ "rule_id": fault.rule_id, "error": fault.source.to_string() }),
                    ));
                    outcome.faults.push(fault);
                    continue;
                }
            };

            audit.push((
                AuditEntryType::RuleEvaluated,
                json!({
                    "rule_id": result.rule_id,
                    "fired": result.fired,
                    "missing_facts": result.missing_facts,
                }),
            ));

            let Some(action) = result.action else {
                continue;
            };

            match winners.get(&action.conflict_key()) {
                Some(&winner) => {
                    tracing::debug!(
                        product_id = %product_id,
                        rule_id = %action.origin_rule_id,
                        kind = %action.kind,
                        superseded_by = %winner,
                        "action suppressed by higher-priority rule"
                    );
                    audit.push((
                        AuditEntryType::ActionSuppressed,
                        json!({
                            "action_id": action.action_id,
                            "rule_id": action.origin_rule_id,
                            "kind": action.kind,
                            "superseded_by": winner,
                        }),
                    ));
                    outcome.suppressed.push(Suppression {
                        action,
                        superseded_by: winner,
                    });
                }
                None => {
                    tracing::info!(
                        product_id = %product_id,
                        rule_id = %action.origin_rule_id,
                        kind = %action.kind,
                        action_target = %action.target,
                        requires_approval = action.requires_approval,
                        "action emitted"
                    );
                    audit.push((
                        AuditEntryType::ActionEmitted,
                        json!({
                            "action_id": action.action_id,
                            "rule_id": action.origin_rule_id,
                            "kind": action.kind,
                            "target": action.target,
                        }),
                    ));
                    winners.insert(action.conflict_key(), action.action_id);
                    outcome.actions.push(action);
                }
            }
        }

        let mut trail = self.audit.lock();
        for (entry_type, metadata) in audit {
            trail.record(entry_type, Some(product), metadata);
        }
        outcome
    }

    fn replay(&self, mut outcome: TriggerOutcome) -> TriggerOutcome {
        tracing::debug!(
            event_id = %outcome.event_id,
            product_id = %outcome.product_id,
            "trigger already processed; replaying outcome"
        );
        self.audit.lock().record(
            AuditEntryType::TriggerReplayed,
            Some(outcome.product_id.as_str()),
            json!({ "event_id": outcome.event_id }),
        );
        outcome.replayed = true;
        outcome
    }
}
