//! Runtime evaluation of condition expressions over a fact snapshot.

use std::cmp::Ordering;

use vos_core::{Decimal, FactValue, ValueType};
use vos_facts::FactSnapshot;

use crate::error::EvalError;
use crate::expr::{BinaryOp, Expr};
use crate::typecheck::binary_result;

/// Evaluate an expression. `AND` and `OR` short-circuit left to right.
pub fn eval(expr: &Expr, facts: &FactSnapshot) -> Result<FactValue, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Fact(name) => facts
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::MissingFact(name.clone())),
        Expr::Neg(inner) => negate(eval(inner, facts)?),
        Expr::Not(inner) => Ok(FactValue::Boolean(!eval_bool(inner, facts)?)),
        Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => Ok(FactValue::Boolean(
            eval_bool(lhs, facts)? && eval_bool(rhs, facts)?,
        )),
        Expr::Binary {
            op: BinaryOp::Or,
            lhs,
            rhs,
        } => Ok(FactValue::Boolean(
            eval_bool(lhs, facts)? || eval_bool(rhs, facts)?,
        )),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval(lhs, facts)?;
            let r = eval(rhs, facts)?;
            if op.is_comparison() {
                compare(*op, &l, &r).map(FactValue::Boolean)
            } else {
                arithmetic(*op, &l, &r)
            }
        }
    }
}

/// Evaluate an expression that must produce a boolean.
pub fn eval_bool(expr: &Expr, facts: &FactSnapshot) -> Result<bool, EvalError> {
    let value = eval(expr, facts)?;
    value
        .as_bool()
        .ok_or_else(|| EvalError::TypeMismatch(format!("expected boolean, found {value}")))
}

fn negate(value: FactValue) -> Result<FactValue, EvalError> {
    let overflow = EvalError::Overflow { op: "negation" };
    match value {
        FactValue::Integer(i) => i.checked_neg().map(FactValue::Integer).ok_or(overflow),
        FactValue::Decimal(d) => d.checked_neg().map(FactValue::Decimal).ok_or(overflow),
        FactValue::Currency(d) => d.checked_neg().map(FactValue::Currency).ok_or(overflow),
        FactValue::Boolean(_) => Err(EvalError::TypeMismatch(
            "cannot negate a boolean".to_string(),
        )),
    }
}

fn compare(op: BinaryOp, l: &FactValue, r: &FactValue) -> Result<bool, EvalError> {
    binary_result(op, l.value_type(), r.value_type())
        .map_err(|e| EvalError::TypeMismatch(e.to_string()))?;

    let ordering = match (l, r) {
        (FactValue::Boolean(a), FactValue::Boolean(b)) => a.cmp(b),
        _ => match (l.as_decimal(), r.as_decimal()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                return Err(EvalError::TypeMismatch(format!(
                    "cannot compare {l} with {r}"
                )))
            }
        },
    };

    match op {
        BinaryOp::Eq => Ok(ordering == Ordering::Equal),
        BinaryOp::Ne => Ok(ordering != Ordering::Equal),
        BinaryOp::Gt => Ok(ordering == Ordering::Greater),
        BinaryOp::Ge => Ok(ordering != Ordering::Less),
        BinaryOp::Lt => Ok(ordering == Ordering::Less),
        BinaryOp::Le => Ok(ordering != Ordering::Greater),
        other => Err(EvalError::TypeMismatch(format!("{other} is not a comparison"))),
    }
}

fn arithmetic(op: BinaryOp, l: &FactValue, r: &FactValue) -> Result<FactValue, EvalError> {
    let result_type = binary_result(op, l.value_type(), r.value_type())
        .map_err(|e| EvalError::TypeMismatch(e.to_string()))?;

    if let (FactValue::Integer(a), FactValue::Integer(b), ValueType::Integer) = (l, r, result_type)
    {
        let (value, name) = match op {
            BinaryOp::Add => (a.checked_add(*b), "addition"),
            BinaryOp::Sub => (a.checked_sub(*b), "subtraction"),
            BinaryOp::Mul => (a.checked_mul(*b), "multiplication"),
            _ => (None, "division"),
        };
        return value
            .map(FactValue::Integer)
            .ok_or(EvalError::Overflow { op: name });
    }

    let (Some(a), Some(b)) = (l.as_decimal(), r.as_decimal()) else {
        return Err(EvalError::TypeMismatch(format!(
            "cannot apply {op} to {l} and {r}"
        )));
    };
    let value = match op {
        BinaryOp::Add => a.checked_add(b).ok_or(EvalError::Overflow { op: "addition" })?,
        BinaryOp::Sub => a
            .checked_sub(b)
            .ok_or(EvalError::Overflow { op: "subtraction" })?,
        BinaryOp::Mul => a
            .checked_mul(b)
            .ok_or(EvalError::Overflow { op: "multiplication" })?,
        BinaryOp::Div => {
            if b.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b)
                .ok_or(EvalError::Overflow { op: "division" })?
        }
        other => {
            return Err(EvalError::TypeMismatch(format!(
                "{other} is not an arithmetic operator"
            )))
        }
    };
    Ok(wrap(result_type, value))
}

fn wrap(value_type: ValueType, value: Decimal) -> FactValue {
    match value_type {
        ValueType::Currency => FactValue::Currency(value),
        _ => FactValue::Decimal(value),
    }
}
