//! # Rules
//!
//! A [`RuleDef`] is the declarative, serializable form of a rule as written
//! in a rule file. [`Rule::compile`] parses and type checks its condition,
//! producing an immutable [`Rule`] that the engine evaluates.
//!
//! ```yaml
//! rules:
//!   - id: ads.three_x_kill
//!     name: 3x Kill Rule
//!     scope: global
//!     triggers: ["schedule.ads_optimization", "marketing.*"]
//!     condition: spend > 3 * target_cpa AND conversions == 0
//!     priority: 100
//!     action:
//!       kind: pause
//!       parameters:
//!         reason: 3x Kill Rule - no conversions
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vos_core::{Action, ActionId, ActionKind, MetricName, ProductId, RuleId, TriggerEvent, ValidationError};
use vos_facts::FactSchema;

use crate::error::RuleLoadError;
use crate::expr::Expr;
use crate::parser::parse_condition;
use crate::typecheck::check_condition;

// ---------------------------------------------------------------------------
// RuleScope
// ---------------------------------------------------------------------------

/// Which products a rule applies to. Serialized as `global` or
/// `product:<id>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuleScope {
    #[default]
    Global,
    Product(ProductId),
}

impl RuleScope {
    pub fn includes(&self, product_id: &ProductId) -> bool {
        match self {
            Self::Global => true,
            Self::Product(p) => p == product_id,
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Product(p) => write!(f, "product:{p}"),
        }
    }
}

impl FromStr for RuleScope {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "global" {
            return Ok(Self::Global);
        }
        match s.strip_prefix("product:") {
            Some(id) => Ok(Self::Product(ProductId::new(id)?)),
            None => Err(ValidationError::UnknownVariant {
                kind: "rule scope (expected \"global\" or \"product:<id>\")",
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for RuleScope {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuleScope> for String {
    fn from(scope: RuleScope) -> Self {
        scope.to_string()
    }
}

// ---------------------------------------------------------------------------
// ActionTemplate
// ---------------------------------------------------------------------------

/// The action a rule emits when it fires.
///
/// `target` may contain `{product_id}` and `{event_type}` placeholders and
/// defaults to `<target system>:<product_id>`. `requires_approval` defaults
/// to the kind's high-impact flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionTemplate {
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<bool>,
}

impl ActionTemplate {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            parameters: BTreeMap::new(),
            requires_approval: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_approval(mut self, required: bool) -> Self {
        self.requires_approval = Some(required);
        self
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
            .unwrap_or_else(|| self.kind.is_high_impact())
    }

    pub fn resolve_target(&self, product_id: &ProductId, event_type: &str) -> String {
        match &self.target {
            Some(template) => template
                .replace("{product_id}", product_id.as_str())
                .replace("{event_type}", event_type),
            None => format!("{}:{}", self.kind.target_system(), product_id),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleDef
// ---------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}

/// Declarative rule as written in a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: RuleScope,
    /// Event-type patterns (`*`, exact, or `prefix.*`). Empty matches all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,
    pub condition: String,
    pub action: ActionTemplate,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RuleDef {
    pub fn new(id: impl Into<String>, condition: impl Into<String>, action: ActionTemplate) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            scope: RuleScope::Global,
            triggers: Vec::new(),
            condition: condition.into(),
            action,
            priority: 0,
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// A compiled, immutable rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    id: RuleId,
    def: RuleDef,
    condition: Expr,
    referenced: Vec<MetricName>,
}

impl Rule {
    /// Parse and type check a rule definition.
    pub fn compile(def: RuleDef, schema: &FactSchema) -> Result<Rule, RuleLoadError> {
        let id = RuleId::new(def.id.clone())?;
        let invalid = |reason: String| RuleLoadError::InvalidDefinition {
            rule_id: def.id.clone(),
            reason,
        };

        for pattern in &def.triggers {
            let valid = pattern == "*"
                || (!pattern.is_empty()
                    && !pattern.chars().any(char::is_whitespace)
                    && pattern.find('*').map_or(true, |i| {
                        i == pattern.len() - 1 && pattern.ends_with(".*")
                    }));
            if !valid {
                return Err(invalid(format!(
                    "trigger pattern \"{pattern}\" must be \"*\", an event type, or \"prefix.*\""
                )));
            }
        }
        if let Some(target) = &def.action.target {
            if target.trim().is_empty() {
                return Err(invalid("action target must not be empty".to_string()));
            }
        }

        let condition = parse_condition(&def.condition).map_err(|source| RuleLoadError::Parse {
            rule_id: def.id.clone(),
            source,
        })?;
        check_condition(&condition, schema).map_err(|source| RuleLoadError::Type {
            rule_id: def.id.clone(),
            source,
        })?;
        let referenced = condition.referenced_facts().into_iter().collect();

        Ok(Rule {
            id,
            def,
            condition,
            referenced,
        })
    }

    pub fn id(&self) -> &RuleId {
        &self.id
    }

    /// Display name; falls back to the rule id.
    pub fn name(&self) -> &str {
        self.def.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn description(&self) -> Option<&str> {
        self.def.description.as_deref()
    }

    pub fn scope(&self) -> &RuleScope {
        &self.def.scope
    }

    pub fn triggers(&self) -> &[String] {
        &self.def.triggers
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub fn action(&self) -> &ActionTemplate {
        &self.def.action
    }

    pub fn priority(&self) -> i32 {
        self.def.priority
    }

    pub fn enabled(&self) -> bool {
        self.def.enabled
    }

    /// Metrics the condition reads, sorted.
    pub fn referenced_facts(&self) -> &[MetricName] {
        &self.referenced
    }

    /// The definition the rule was compiled from.
    pub fn definition(&self) -> &RuleDef {
        &self.def
    }

    pub fn applies_to(&self, product_id: &ProductId) -> bool {
        self.def.scope.includes(product_id)
    }

    /// Whether the rule is evaluated for events of this type.
    pub fn listens_to(&self, event_type: &str) -> bool {
        self.def.triggers.is_empty()
            || self.def.triggers.iter().any(|pattern| {
                pattern == "*"
                    || pattern == event_type
                    || pattern
                        .strip_suffix('*')
                        .is_some_and(|prefix| event_type.starts_with(prefix))
            })
    }

    pub fn requires_approval(&self) -> bool {
        self.def.action.requires_approval()
    }

    /// The action this rule emits for `product_id` in response to `event`.
    /// Depends only on its inputs, so redelivered events yield equal actions.
    pub fn instantiate(&self, product_id: &ProductId, event: &TriggerEvent) -> Action {
        let template = &self.def.action;
        Action {
            action_id: ActionId::derive(&event.event_id, product_id, &self.id),
            kind: template.kind,
            product_id: product_id.clone(),
            target: template.resolve_target(product_id, &event.event_type),
            parameters: template.parameters.clone(),
            requires_approval: template.requires_approval(),
            origin_rule_id: self.id.clone(),
            priority: self.def.priority,
            event_id: event.event_id,
            created_at: event.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> FactSchema {
        FactSchema::standard()
    }

    fn kill_def() -> RuleDef {
        RuleDef::new(
            "ads.three_x_kill",
            "spend > 3 * target_cpa AND conversions == 0",
            ActionTemplate::new(ActionKind::Pause).with_parameter("reason", json!("no conversions")),
        )
        .with_priority(100)
    }

    #[test]
    fn compile_collects_referenced_facts() {
        let rule = Rule::compile(kill_def(), &schema()).unwrap();
        let names: Vec<&str> = rule.referenced_facts().iter().map(|m| m.as_str()).collect();
        assert_eq!(names, vec!["conversions", "spend", "target_cpa"]);
        assert_eq!(rule.name(), "ads.three_x_kill");
    }

    #[test]
    fn compile_rejects_unparsable_condition() {
        let def = RuleDef::new("bad", "spend >", ActionTemplate::new(ActionKind::Alert));
        assert!(matches!(
            Rule::compile(def, &schema()),
            Err(RuleLoadError::Parse { .. })
        ));
    }

    #[test]
    fn compile_rejects_ill_typed_condition() {
        let def = RuleDef::new("bad", "spend > 3", ActionTemplate::new(ActionKind::Alert));
        assert!(matches!(
            Rule::compile(def, &schema()),
            Err(RuleLoadError::Type { .. })
        ));
    }

    #[test]
    fn compile_rejects_bad_id_and_patterns() {
        let def = RuleDef::new("has space", "in_learning_phase", ActionTemplate::new(ActionKind::Hold));
        assert!(matches!(
            Rule::compile(def, &schema()),
            Err(RuleLoadError::Validation(_))
        ));

        let def = RuleDef::new("r", "in_learning_phase", ActionTemplate::new(ActionKind::Hold))
            .with_triggers(["mon*itoring"]);
        assert!(matches!(
            Rule::compile(def, &schema()),
            Err(RuleLoadError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn trigger_patterns() {
        let rule = Rule::compile(
            kill_def().with_triggers(["schedule.ads_optimization", "marketing.*"]),
            &schema(),
        )
        .unwrap();
        assert!(rule.listens_to("schedule.ads_optimization"));
        assert!(rule.listens_to("marketing.ad_threshold"));
        assert!(!rule.listens_to("schedule.health_check"));

        let any = Rule::compile(kill_def(), &schema()).unwrap();
        assert!(any.listens_to("anything.at_all"));
    }

    #[test]
    fn scope_serialization() {
        let scope: RuleScope = serde_json::from_str("\"product:acme\"").unwrap();
        assert_eq!(scope, RuleScope::Product(ProductId::new("acme").unwrap()));
        assert_eq!(serde_json::to_string(&scope).unwrap(), "\"product:acme\"");
        assert!(serde_json::from_str::<RuleScope>("\"everyone\"").is_err());
        assert!(RuleScope::Global.includes(&ProductId::new("x").unwrap()));
    }

    #[test]
    fn instantiate_derives_action() {
        let rule = Rule::compile(kill_def(), &schema()).unwrap();
        let product = ProductId::new("acme").unwrap();
        let event = TriggerEvent::new("scheduler:ads_optimization", "schedule.ads_optimization");
        let a = rule.instantiate(&product, &event);
        let b = rule.instantiate(&product, &event);
        assert_eq!(a, b);
        assert_eq!(a.kind, ActionKind::Pause);
        assert_eq!(a.target, "ad_platform:acme");
        assert!(!a.requires_approval);
        assert_eq!(a.origin_rule_id.as_str(), "ads.three_x_kill");
        assert_eq!(a.created_at, event.timestamp);
        assert_eq!(a.parameters["reason"], json!("no conversions"));
    }

    #[test]
    fn template_target_placeholders_and_approval_override() {
        let template = ActionTemplate::new(ActionKind::Scale20Pct)
            .with_target("campaign:{product_id}:{event_type}")
            .with_approval(false);
        let product = ProductId::new("acme").unwrap();
        assert_eq!(
            template.resolve_target(&product, "schedule.daily"),
            "campaign:acme:schedule.daily"
        );
        assert!(!template.requires_approval());
        assert!(ActionTemplate::new(ActionKind::Scale20Pct).requires_approval());
    }

    #[test]
    fn rule_def_yaml_defaults() {
        let def: RuleDef = serde_yaml::from_str(
            "id: r1\ncondition: in_learning_phase\naction:\n  kind: hold\n",
        )
        .unwrap();
        assert!(def.enabled);
        assert_eq!(def.priority, 0);
        assert_eq!(def.scope, RuleScope::Global);

        let unknown = serde_yaml::from_str::<RuleDef>(
            "id: r1\ncondition: x\nactoin:\n  kind: hold\n",
        );
        assert!(unknown.is_err());
    }
}
