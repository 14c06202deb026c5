//! # Static Type Checking
//!
//! Conditions are checked against the fact schema when a rule set loads.
//!
//! | Operation                         | Result     |
//! |-----------------------------------|------------|
//! | currency ± currency               | currency   |
//! | currency × number, number × currency | currency |
//! | currency ÷ number                 | currency   |
//! | currency ÷ currency               | decimal    |
//! | integer ± × integer               | integer    |
//! | number ± × ÷ number (otherwise)   | decimal    |
//!
//! where *number* is `integer` or `decimal`. Comparisons require both sides
//! to be currency, both numbers, or (for `==`/`!=` only) both booleans.

use vos_core::ValueType;
use vos_facts::FactSchema;

use crate::error::TypeError;
use crate::expr::{BinaryOp, Expr};

/// Check that a condition is a well-typed boolean expression.
pub fn check_condition(expr: &Expr, schema: &FactSchema) -> Result<(), TypeError> {
    match type_of(expr, schema)? {
        ValueType::Boolean => Ok(()),
        found => Err(TypeError::NotBoolean {
            context: "condition",
            found,
        }),
    }
}

/// The static type of an expression.
pub fn type_of(expr: &Expr, schema: &FactSchema) -> Result<ValueType, TypeError> {
    match expr {
        Expr::Literal(value) => Ok(value.value_type()),
        Expr::Fact(name) => schema
            .value_type(name)
            .ok_or_else(|| TypeError::UnknownMetric(name.clone())),
        Expr::Neg(inner) => match type_of(inner, schema)? {
            ValueType::Boolean => Err(TypeError::NotNumeric {
                found: ValueType::Boolean,
            }),
            numeric => Ok(numeric),
        },
        Expr::Not(inner) => match type_of(inner, schema)? {
            ValueType::Boolean => Ok(ValueType::Boolean),
            found => Err(TypeError::NotBoolean {
                context: "operand of NOT",
                found,
            }),
        },
        Expr::Binary { op, lhs, rhs } => {
            let l = type_of(lhs, schema)?;
            let r = type_of(rhs, schema)?;
            binary_result(*op, l, r)
        }
    }
}

/// Result type of a binary operator applied to operand types. Shared with
/// the evaluator so static and runtime typing cannot diverge.
pub fn binary_result(op: BinaryOp, l: ValueType, r: ValueType) -> Result<ValueType, TypeError> {
    use ValueType::{Boolean, Currency, Decimal, Integer};

    let incompatible = || TypeError::IncompatibleOperands { op, lhs: l, rhs: r };

    if op.is_logical() {
        return match (l, r) {
            (Boolean, Boolean) => Ok(Boolean),
            (Boolean, found) | (found, _) => Err(TypeError::NotBoolean {
                context: "operand of AND/OR",
                found,
            }),
        };
    }

    if op.is_comparison() {
        let comparable = match (l, r) {
            (Boolean, Boolean) => !op.is_ordering(),
            (Currency, Currency) => true,
            (a, b) => a.is_dimensionless() && b.is_dimensionless(),
        };
        return if comparable {
            Ok(Boolean)
        } else {
            Err(incompatible())
        };
    }

    let widen = |a: ValueType, b: ValueType| {
        if a == Integer && b == Integer {
            Integer
        } else {
            Decimal
        }
    };

    match (op, l, r) {
        (_, Boolean, _) | (_, _, Boolean) => Err(incompatible()),
        (BinaryOp::Add | BinaryOp::Sub, Currency, Currency) => Ok(Currency),
        (BinaryOp::Mul, Currency, n) | (BinaryOp::Mul, n, Currency) if n.is_dimensionless() => {
            Ok(Currency)
        }
        (BinaryOp::Div, Currency, n) if n.is_dimensionless() => Ok(Currency),
        (BinaryOp::Div, Currency, Currency) => Ok(Decimal),
        (BinaryOp::Div, a, b) if a.is_dimensionless() && b.is_dimensionless() => Ok(Decimal),
        (_, a, b) if a.is_dimensionless() && b.is_dimensionless() => Ok(widen(a, b)),
        _ => Err(incompatible()),
    }
}
