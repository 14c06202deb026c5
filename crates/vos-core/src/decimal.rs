//! # Exact Decimals
//!
//! [`Decimal`] is a signed fixed-point number with six fractional digits,
//! stored as an `i128` count of millionths. Currency facts (spend, CPA,
//! budgets) and dimensionless ratios (CTR, ROAS, frequency) both use it, so
//! a comparison such as `spend > 3 * target_cpa` never suffers binary
//! floating-point drift.
//!
//! Decimals parse from strings (`"300"`, `"-1.5"`, `"0.000001"`) or integers.
//! Float literals are rejected on deserialization: `0.1` has no exact binary
//! representation and must be written as `"0.1"`.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Number of fractional decimal digits carried by a [`Decimal`].
pub const SCALE: u32 = 6;

const UNIT: i128 = 1_000_000;

/// Exact fixed-point decimal with [`SCALE`] fractional digits.
///
/// Multiplication and division results with more than six fractional digits
/// are truncated toward zero. Every arithmetic operation is checked: overflow
/// and division by zero return `None` instead of a wrong value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Decimal(i128);

impl Decimal {
    /// Zero.
    pub const ZERO: Decimal = Decimal(0);

    /// One.
    pub const ONE: Decimal = Decimal(UNIT);

    /// Whole-number decimal.
    pub fn from_int(value: i64) -> Self {
        Self(i128::from(value) * UNIT)
    }

    /// Decimal from a raw count of millionths.
    pub fn from_micros(micros: i128) -> Self {
        Self(micros)
    }

    /// The raw count of millionths.
    pub fn micros(&self) -> i128 {
        self.0
    }

    /// Parse a decimal literal: optional sign, digits, optional fractional
    /// part of at most six digits.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let err = |reason: &str| ValidationError::InvalidDecimal {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let (negative, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err("empty"));
        }
        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(err("expected digits with an optional decimal point"));
        }
        if frac_part.len() > SCALE as usize {
            return Err(err("more than 6 fractional digits"));
        }

        let int_value: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err("out of range"))?
        };
        let frac_value: i128 = if frac_part.is_empty() {
            0
        } else {
            let digits: i128 = frac_part.parse().map_err(|_| err("out of range"))?;
            digits * 10_i128.pow(SCALE - frac_part.len() as u32)
        };

        let units = int_value
            .checked_mul(UNIT)
            .and_then(|v| v.checked_add(frac_value))
            .ok_or_else(|| err("out of range"))?;
        Ok(Self(if negative { -units } else { units }))
    }

    /// Checked addition.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Checked multiplication, truncating toward zero.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(|v| Self(v / UNIT))
    }

    /// Checked division, truncating toward zero. `None` when `rhs` is zero.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.0 == 0 {
            return None;
        }
        self.0.checked_mul(UNIT).and_then(|v| v.checked_div(rhs.0)).map(Self)
    }

    /// Checked negation.
    pub fn checked_neg(self) -> Option<Self> {
        self.0.checked_neg().map(Self)
    }

    /// Whether the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whether the value is below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_int(value)
    }
}

impl FromStr for Decimal {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / UNIT as u128;
        let frac = abs % UNIT as u128;
        if frac == 0 {
            write!(f, "{sign}{whole}")
        } else {
            let digits = format!("{frac:06}");
            write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
        }
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalVisitor)
    }
}

struct DecimalVisitor;

impl<'de> Visitor<'de> for DecimalVisitor {
    type Value = Decimal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or an integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
        Decimal::parse(v).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
        Ok(Decimal::from_int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
        i64::try_from(v)
            .map(Decimal::from_int)
            .map_err(|_| E::custom(format!("integer {v} out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
        Err(E::custom(format!(
            "float {v} is not an exact decimal; write it as a string (\"{v}\")"
        )))
    }
}
