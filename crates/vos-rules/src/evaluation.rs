//! Single-rule evaluation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vos_core::{Action, MetricName, RuleId, TriggerEvent};
use vos_facts::FactSnapshot;

use crate::error::EvaluationFault;
use crate::eval::eval_bool;
use crate::rule::Rule;

/// Outcome of evaluating one rule against one fact snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub rule_id: RuleId,
    pub fired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Referenced metrics absent from the snapshot. Non-empty implies
    /// `fired == false`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_facts: Vec<MetricName>,
    pub priority: i32,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    fn not_fired(rule: &Rule, event: &TriggerEvent, missing_facts: Vec<MetricName>) -> Self {
        Self {
            rule_id: rule.id().clone(),
            fired: false,
            action: None,
            missing_facts,
            priority: rule.priority(),
            evaluated_at: event.timestamp,
        }
    }
}

/// Evaluate `rule` against `facts` in response to `event`.
///
/// Pure: the result depends only on the arguments. A disabled rule or a
/// condition referencing a missing fact does not fire and is not an error.
/// Runtime faults (division by zero, overflow) are returned as
/// [`EvaluationFault`] for the caller to isolate.
pub fn evaluate(
    rule: &Rule,
    facts: &FactSnapshot,
    event: &TriggerEvent,
) -> Result<EvaluationResult, EvaluationFault> {
    if !rule.enabled() {
        return Ok(EvaluationResult::not_fired(rule, event, Vec::new()));
    }

    let missing: Vec<MetricName> = rule
        .referenced_facts()
        .iter()
        .filter(|m| !facts.contains(m))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Ok(EvaluationResult::not_fired(rule, event, missing));
    }

    let fired = eval_bool(rule.condition(), facts).map_err(|source| EvaluationFault {
        rule_id: rule.id().clone(),
        source,
    })?;

    let action = fired.then(|| rule.instantiate(facts.product_id(), event));
    Ok(EvaluationResult {
        rule_id: rule.id().clone(),
        fired,
        action,
        missing_facts: Vec::new(),
        priority: rule.priority(),
        evaluated_at: event.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::rule::{ActionTemplate, RuleDef};
    use proptest::prelude::*;
    use vos_core::{ActionKind, Decimal, FactValue, ProductId};
    use vos_facts::FactSchema;

    fn rule(condition: &str, kind: ActionKind) -> Rule {
        Rule::compile(
            RuleDef::new("test.rule", condition, ActionTemplate::new(kind)),
            &FactSchema::standard(),
        )
        .unwrap()
    }

    fn usd(s: &str) -> FactValue {
        FactValue::Currency(Decimal::parse(s).unwrap())
    }

    fn facts(values: &[(&str, FactValue)]) -> FactSnapshot {
        values.iter().fold(
            FactSnapshot::new(ProductId::new("acme").unwrap()),
            |snap, (name, value)| snap.with(MetricName::new(*name).unwrap(), value.clone()),
        )
    }

    fn event() -> TriggerEvent {
        TriggerEvent::new("scheduler:ads_optimization", "schedule.ads_optimization")
    }

    #[test]
    fn fires_and_builds_action() {
        let r = rule("spend > 3 * target_cpa AND conversions == 0", ActionKind::Pause);
        let snap = facts(&[
            ("spend", usd("300.01")),
            ("target_cpa", usd("100")),
            ("conversions", FactValue::Integer(0)),
        ]);
        let result = evaluate(&r, &snap, &event()).unwrap();
        assert!(result.fired);
        let action = result.action.unwrap();
        assert_eq!(action.kind, ActionKind::Pause);
        assert_eq!(action.product_id.as_str(), "acme");
    }

    #[test]
    fn not_fired_carries_no_action() {
        let r = rule("conversions == 0", ActionKind::Pause);
        let snap = facts(&[("conversions", FactValue::Integer(3))]);
        let result = evaluate(&r, &snap, &event()).unwrap();
        assert!(!result.fired);
        assert!(result.action.is_none());
        assert!(result.missing_facts.is_empty());
    }

    #[test]
    fn missing_facts_do_not_fire() {
        let r = rule("spend > 3 * target_cpa AND conversions == 0", ActionKind::Pause);
        let snap = facts(&[("spend", usd("1000"))]);
        let result = evaluate(&r, &snap, &event()).unwrap();
        assert!(!result.fired);
        let missing: Vec<&str> = result.missing_facts.iter().map(|m| m.as_str()).collect();
        assert_eq!(missing, vec!["conversions", "target_cpa"]);
    }

    #[test]
    fn disabled_rule_never_fires() {
        let r = Rule::compile(
            RuleDef::new("off", "conversions == 0", ActionTemplate::new(ActionKind::Pause)).disabled(),
            &FactSchema::standard(),
        )
        .unwrap();
        let snap = facts(&[("conversions", FactValue::Integer(0))]);
        assert!(!evaluate(&r, &snap, &event()).unwrap().fired);
    }

    #[test]
    fn division_by_zero_is_a_fault() {
        let r = rule("spend / target_cpa > 3", ActionKind::Alert);
        let snap = facts(&[("spend", usd("10")), ("target_cpa", usd("0"))]);
        let fault = evaluate(&r, &snap, &event()).unwrap_err();
        assert_eq!(fault.rule_id.as_str(), "test.rule");
        assert_eq!(fault.source, EvalError::DivisionByZero);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let r = rule("cpa < 0.8 * target_cpa AND conversions >= 10", ActionKind::Scale20Pct);
        let snap = facts(&[
            ("cpa", usd("75")),
            ("target_cpa", usd("100")),
            ("conversions", FactValue::Integer(12)),
        ]);
        let ev = event();
        assert_eq!(evaluate(&r, &snap, &ev).unwrap(), evaluate(&r, &snap, &ev).unwrap());
    }

    proptest! {
        #[test]
        fn any_missing_reference_means_not_fired(
            spend in 0i64..1_000_000,
            cpa in 0i64..1_000_000,
            drop_spend in any::<bool>(),
        ) {
            let r = rule("spend > 3 * target_cpa AND conversions == 0", ActionKind::Pause);
            let mut snap = facts(&[("conversions", FactValue::Integer(0))]);
            if drop_spend {
                snap.insert(MetricName::new("target_cpa").unwrap(), FactValue::Currency(Decimal::from_int(cpa)));
            } else {
                snap.insert(MetricName::new("spend").unwrap(), FactValue::Currency(Decimal::from_int(spend)));
            }
            let result = evaluate(&r, &snap, &event()).unwrap();
            prop_assert!(!result.fired);
            prop_assert_eq!(result.missing_facts.len(), 1);
        }
    }
}
