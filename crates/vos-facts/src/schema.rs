//! # Fact Schema
//!
//! Declares the value type of every metric the store accepts. Rules are type
//! checked against the same schema at load time, so a condition can only
//! reference metrics that can actually be recorded.
//!
//! ```yaml
//! metrics:
//!   spend:
//!     type: currency
//!     description: Lifetime campaign spend
//!   conversions:
//!     type: integer
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vos_core::{Decimal, FactValue, MetricName, ProductId, ValueType};

use crate::error::{FactError, FactResult};
use crate::fact::Fact;

/// Declaration of a single metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Metric name → declared type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactSchema {
    #[serde(default)]
    metrics: BTreeMap<MetricName, MetricSpec>,
}

impl FactSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertising and service-health metrics used by the standard rules.
    pub fn standard() -> Self {
        const METRICS: &[(&str, ValueType, &str)] = &[
            // advertising
            ("spend", ValueType::Currency, "Campaign spend over the evaluation period"),
            ("spend_today", ValueType::Currency, "Campaign spend since midnight UTC"),
            ("daily_budget", ValueType::Currency, "Configured daily campaign budget"),
            ("target_cpa", ValueType::Currency, "Target cost per acquisition"),
            ("cpa", ValueType::Currency, "Observed cost per acquisition"),
            ("revenue", ValueType::Currency, "Attributed revenue"),
            ("conversions", ValueType::Integer, "Conversions over the evaluation period"),
            ("impressions", ValueType::Integer, "Ad impressions"),
            ("clicks", ValueType::Integer, "Ad clicks"),
            ("ctr", ValueType::Decimal, "Click-through rate as a fraction"),
            ("frequency", ValueType::Decimal, "Average impressions per user"),
            ("roas", ValueType::Decimal, "Return on ad spend"),
            ("in_learning_phase", ValueType::Boolean, "Campaign is in the platform learning phase"),
            // service health
            ("error_rate", ValueType::Decimal, "Error rate in percent"),
            ("response_time_p95", ValueType::Decimal, "95th percentile response time in ms"),
            ("uptime", ValueType::Decimal, "Uptime in percent"),
            ("open_incidents", ValueType::Integer, "Currently open incidents"),
            // business
            ("mrr", ValueType::Currency, "Monthly recurring revenue"),
            ("active_users", ValueType::Integer, "Active users"),
            ("churn_rate", ValueType::Decimal, "Monthly churn in percent"),
        ];

        let mut schema = Self::new();
        for (name, value_type, description) in METRICS {
            if let Ok(metric) = MetricName::new(*name) {
                schema.metrics.insert(
                    metric,
                    MetricSpec {
                        value_type: *value_type,
                        description: Some((*description).to_string()),
                    },
                );
            }
        }
        schema
    }

    /// Builder-style metric declaration.
    pub fn with_metric(mut self, metric: MetricName, value_type: ValueType) -> Self {
        self.insert(metric, value_type);
        self
    }

    pub fn insert(&mut self, metric: MetricName, value_type: ValueType) {
        self.metrics.insert(
            metric,
            MetricSpec {
                value_type,
                description: None,
            },
        );
    }

    /// Add every metric of `other`, overriding existing declarations.
    pub fn merge(&mut self, other: FactSchema) {
        self.metrics.extend(other.metrics);
    }

    pub fn value_type(&self, metric: &MetricName) -> Option<ValueType> {
        self.metrics.get(metric).map(|spec| spec.value_type)
    }

    pub fn metrics(&self) -> impl Iterator<Item = (&MetricName, &MetricSpec)> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn load(path: &Path) -> FactResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FactError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                FactError::Io(e)
            }
        })?;
        Self::from_yaml_str(&content).map_err(|source| FactError::SchemaParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject a fact whose metric is undeclared or whose value has the wrong
    /// type.
    pub fn check(&self, fact: &Fact) -> FactResult<()> {
        let expected = self.expected_type(&fact.product_id, &fact.metric)?;
        let actual = fact.value.value_type();
        if expected != actual {
            return Err(FactError::InvalidFact {
                product_id: fact.product_id.clone(),
                metric: fact.metric.clone(),
                reason: format!("expected {expected}, got {actual}"),
            });
        }
        Ok(())
    }

    /// Convert an untyped JSON value into the metric's declared type.
    ///
    /// Decimals accept strings and integers (currency also accepts a leading
    /// `$`); floats are rejected because they are not exact. Integers accept
    /// JSON integers and integer strings; booleans accept `true`/`false` in
    /// either form.
    pub fn coerce(
        &self,
        product_id: &ProductId,
        metric: &MetricName,
        raw: &serde_json::Value,
    ) -> FactResult<FactValue> {
        use serde_json::Value;

        let expected = self.expected_type(product_id, metric)?;
        let invalid = |reason: String| FactError::InvalidFact {
            product_id: product_id.clone(),
            metric: metric.clone(),
            reason,
        };

        match (expected, raw) {
            (ValueType::Currency | ValueType::Decimal, Value::String(s)) => {
                let digits = match expected {
                    ValueType::Currency => s.trim().strip_prefix('$').unwrap_or(s),
                    _ => s.as_str(),
                };
                let d = Decimal::parse(digits).map_err(|e| invalid(e.to_string()))?;
                Ok(wrap_decimal(expected, d))
            }
            (ValueType::Currency | ValueType::Decimal, Value::Number(n)) => match n.as_i64() {
                Some(i) => Ok(wrap_decimal(expected, Decimal::from_int(i))),
                None => Err(invalid(format!(
                    "{n} is not exact; send fractional {expected} values as strings"
                ))),
            },
            (ValueType::Integer, Value::Number(n)) => n
                .as_i64()
                .map(FactValue::Integer)
                .ok_or_else(|| invalid(format!("{n} is not an integer"))),
            (ValueType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(FactValue::Integer)
                .map_err(|_| invalid(format!("\"{s}\" is not an integer"))),
            (ValueType::Boolean, Value::Bool(b)) => Ok(FactValue::Boolean(*b)),
            (ValueType::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Ok(FactValue::Boolean(true)),
                "false" => Ok(FactValue::Boolean(false)),
                _ => Err(invalid(format!("\"{s}\" is not a boolean"))),
            },
            (expected, other) => Err(invalid(format!("expected {expected}, got {other}"))),
        }
    }

    fn expected_type(&self, product_id: &ProductId, metric: &MetricName) -> FactResult<ValueType> {
        self.value_type(metric)
            .ok_or_else(|| FactError::InvalidFact {
                product_id: product_id.clone(),
                metric: metric.clone(),
                reason: "metric is not declared in the schema".to_string(),
            })
    }
}

fn wrap_decimal(value_type: ValueType, d: Decimal) -> FactValue {
    match value_type {
        ValueType::Currency => FactValue::Currency(d),
        _ => FactValue::Decimal(d),
    }
}
