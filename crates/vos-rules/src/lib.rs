//! # vos-rules — Rule Evaluator and Rules Engine
//!
//! Rules are declarative: a boolean condition over fact values plus an action
//! template. Conditions are written in a small expression language
//! (`conversions == 0 AND spend > 3 * target_cpa`), parsed once, and type
//! checked against the fact schema when the rule set loads. A rule set that
//! fails to parse or type check is rejected as a whole.
//!
//! ## Evaluation
//!
//! [`evaluate`] is a pure function of a rule and a fact snapshot. A missing
//! fact makes the rule not fire; division by zero and overflow are
//! [`EvaluationFault`]s that the engine isolates to the offending rule.
//!
//! ## Conflict Resolution
//!
//! [`RulesEngine::on_trigger`] evaluates applicable rules in priority order
//! (higher first, rule id ascending on ties). When two fired actions share a
//! conflict key (product, conflict class, target), only the higher-priority
//! action is emitted; the loser is recorded as a [`Suppression`].
//!
//! ## Determinism
//!
//! Given the same rule set, fact snapshot and trigger, the engine emits the
//! same actions in the same order with the same action identifiers.

pub mod engine;
pub mod error;
pub mod eval;
pub mod evaluation;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod rule;
pub mod ruleset;
pub mod standard;
pub mod typecheck;

pub use engine::{RulesEngine, Suppression, TriggerOutcome};
pub use error::{EvalError, EvaluationFault, ParseError, RuleLoadError, TypeError};
pub use evaluation::{evaluate, EvaluationResult};
pub use expr::{BinaryOp, Expr};
pub use parser::parse_condition;
pub use rule::{ActionTemplate, Rule, RuleDef, RuleScope};
pub use ruleset::RuleSet;
