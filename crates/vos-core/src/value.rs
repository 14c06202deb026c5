//! # Typed Fact Values
//!
//! Every metric in the fact schema has a [`ValueType`]; every observation
//! carries a [`FactValue`] of exactly that type. Currency is kept distinct
//! from dimensionless decimals so that the rule type checker can reject
//! comparisons like `spend > ctr`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::ValidationError;

/// The declared type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// An exact monetary amount.
    Currency,
    /// An exact dimensionless decimal (ratio, rate, percentage).
    Decimal,
    /// A signed integer count.
    Integer,
    /// A boolean flag.
    Boolean,
}

impl ValueType {
    /// Whether values of this type take part in arithmetic.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Boolean)
    }

    /// Whether the type is a plain number without a currency unit.
    pub fn is_dimensionless(&self) -> bool {
        matches!(self, Self::Decimal | Self::Integer)
    }

    /// The schema string for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "currency" => Ok(Self::Currency),
            "decimal" => Ok(Self::Decimal),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            other => Err(ValidationError::UnknownVariant {
                kind: "value type",
                value: other.to_string(),
            }),
        }
    }
}

/// A typed metric value.
///
/// Serialized as `{"type": "currency", "value": "300"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    /// A monetary amount.
    Currency(Decimal),
    /// A dimensionless decimal.
    Decimal(Decimal),
    /// An integer count.
    Integer(i64),
    /// A boolean flag.
    Boolean(bool),
}

impl FactValue {
    /// The type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Currency(_) => ValueType::Currency,
            Self::Decimal(_) => ValueType::Decimal,
            Self::Integer(_) => ValueType::Integer,
            Self::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Numeric view of the value; `None` for booleans.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Currency(d) | Self::Decimal(d) => Some(*d),
            Self::Integer(i) => Some(Decimal::from_int(*i)),
            Self::Boolean(_) => None,
        }
    }

    /// Boolean view of the value; `None` for numbers.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for FactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Currency(d) => write!(f, "${d}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_round_trips_through_str() {
        for t in [
            ValueType::Currency,
            ValueType::Decimal,
            ValueType::Integer,
            ValueType::Boolean,
        ] {
            assert_eq!(t.as_str().parse::<ValueType>().unwrap(), t);
        }
        assert!("float".parse::<ValueType>().is_err());
    }

    #[test]
    fn integer_widens_to_decimal() {
        assert_eq!(
            FactValue::Integer(12).as_decimal(),
            Some(Decimal::from_int(12))
        );
        assert_eq!(FactValue::Boolean(true).as_decimal(), None);
    }

    #[test]
    fn tagged_serialization() {
        let v = FactValue::Currency(Decimal::parse("300.50").unwrap());
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json, serde_json::json!({"type": "currency", "value": "300.5"}));
        let back: FactValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn display_marks_currency() {
        assert_eq!(
            FactValue::Currency(Decimal::from_int(5)).to_string(),
            "$5"
        );
        assert_eq!(FactValue::Boolean(false).to_string(), "false");
    }
}
