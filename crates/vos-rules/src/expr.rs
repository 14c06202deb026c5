//! # Condition Expressions
//!
//! The typed expression tree produced by the parser. Rendering an
//! expression with `Display` yields condition source text that parses back to
//! an equivalent tree, using the minimum number of parentheses.

use std::collections::BTreeSet;
use std::fmt;

use vos_core::{FactValue, MetricName};

/// Binary operators, loosest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Or => "OR",
            Self::And => "AND",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::Or | Self::And)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Gt | Self::Ge | Self::Lt | Self::Le
        )
    }

    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div)
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::Gt | Self::Ge | Self::Lt | Self::Le => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div => 6,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

const NOT_PRECEDENCE: u8 = 3;
const NEG_PRECEDENCE: u8 = 7;
const ATOM_PRECEDENCE: u8 = 8;

/// A condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(FactValue),
    Fact(MetricName),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Every metric the expression reads, sorted.
    pub fn referenced_facts(&self) -> BTreeSet<MetricName> {
        let mut out = BTreeSet::new();
        self.collect_facts(&mut out);
        out
    }

    fn collect_facts(&self, out: &mut BTreeSet<MetricName>) {
        match self {
            Self::Literal(_) => {}
            Self::Fact(name) => {
                out.insert(name.clone());
            }
            Self::Neg(inner) | Self::Not(inner) => inner.collect_facts(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_facts(out);
                rhs.collect_facts(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Literal(_) | Self::Fact(_) => ATOM_PRECEDENCE,
            Self::Neg(_) => NEG_PRECEDENCE,
            Self::Not(_) => NOT_PRECEDENCE,
            Self::Binary { op, .. } => op.precedence(),
        }
    }
}

struct Operand<'a> {
    expr: &'a Expr,
    parenthesize: bool,
}

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parenthesize {
            write!(f, "({})", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Fact(name) => write!(f, "{name}"),
            Self::Neg(inner) => {
                let operand = Operand {
                    expr: inner,
                    parenthesize: inner.precedence() < ATOM_PRECEDENCE,
                };
                write!(f, "-{operand}")
            }
            Self::Not(inner) => {
                let operand = Operand {
                    expr: inner,
                    parenthesize: inner.precedence() < NOT_PRECEDENCE,
                };
                write!(f, "NOT {operand}")
            }
            Self::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                // Comparisons do not chain; arithmetic and logic are
                // left-associative.
                let lhs = Operand {
                    expr: lhs,
                    parenthesize: lhs.precedence() < prec
                        || (op.is_comparison() && lhs.precedence() == prec),
                };
                let rhs = Operand {
                    expr: rhs,
                    parenthesize: rhs.precedence() <= prec,
                };
                write!(f, "{lhs} {op} {rhs}")
            }
        }
    }
}
