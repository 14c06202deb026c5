//! Rule loading and evaluation errors.

use std::path::PathBuf;

use serde::{Serialize, Serializer};
use thiserror::Error;
use vos_core::{MetricName, RuleId, ValidationError, ValueType};

use crate::expr::BinaryOp;

/// A condition string could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at column {column}: {message}")]
pub struct ParseError {
    /// 1-based column of the offending token.
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn at(offset: usize, message: impl Into<String>) -> Self {
        Self {
            column: offset + 1,
            message: message.into(),
        }
    }
}

/// A condition is ill-typed against the fact schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown metric \"{0}\"")]
    UnknownMetric(MetricName),

    #[error("operator {op} cannot combine {lhs} and {rhs}")]
    IncompatibleOperands {
        op: BinaryOp,
        lhs: ValueType,
        rhs: ValueType,
    },

    #[error("expected a boolean {context}, found {found}")]
    NotBoolean {
        context: &'static str,
        found: ValueType,
    },

    #[error("cannot negate a {found}")]
    NotNumeric { found: ValueType },
}

/// A runtime failure while evaluating a well-typed condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow in {op}")]
    Overflow { op: &'static str },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("fact \"{0}\" is not present")]
    MissingFact(MetricName),
}

/// An evaluation fault, attributed to the rule that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("rule {rule_id} faulted: {source}")]
pub struct EvaluationFault {
    pub rule_id: RuleId,
    #[source]
    pub source: EvalError,
}

impl Serialize for EvaluationFault {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("EvaluationFault", 2)?;
        s.serialize_field("rule_id", &self.rule_id)?;
        s.serialize_field("error", &self.source.to_string())?;
        s.end()
    }
}

/// A rule set failed to load. No engine is built from a failing set.
#[derive(Error, Debug)]
pub enum RuleLoadError {
    #[error("rule {rule_id}: condition does not parse: {source}")]
    Parse { rule_id: String, source: ParseError },

    #[error("rule {rule_id}: condition is ill-typed: {source}")]
    Type { rule_id: String, source: TypeError },

    #[error("rule {rule_id}: {reason}")]
    InvalidDefinition { rule_id: String, reason: String },

    #[error("duplicate rule id \"{rule_id}\"")]
    DuplicateRule { rule_id: String },

    #[error("failed to parse rule YAML at {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("rule file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
