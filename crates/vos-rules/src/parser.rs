//! # Condition Parser
//!
//! Recursive-descent parser for rule conditions.
//!
//! ```text
//! or      := and (("OR" | "||") and)*
//! and     := not (("AND" | "&&") not)*
//! not     := ("NOT" | "!") not | compare
//! compare := sum ((">" | ">=" | "<" | "<=" | "==" | "!=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "×" | "/") unary)*
//! unary   := "-" unary | primary
//! primary := number | "$" number | "true" | "false" | metric | "(" or ")"
//! ```
//!
//! Integer literals are `integer`, literals with a decimal point are
//! `decimal`, `$`-prefixed literals are `currency`.

use vos_core::{Decimal, FactValue, MetricName};

use crate::error::ParseError;
use crate::expr::{BinaryOp, Expr};
use crate::lexer::{tokenize, Spanned, Token};

const MAX_DEPTH: usize = 64;

/// Parse condition source text into an expression tree.
pub fn parse_condition(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(t) => Err(ParseError::at(
            t.offset,
            format!("unexpected {} after complete expression", t.token.describe()),
        )),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, want: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.peek().map(|s| s.offset).unwrap_or(self.end)
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::at(self.offset(), "expression nested too deeply"));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = Expr::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.not()?;
        while self.eat(&Token::And) {
            let rhs = self.not()?;
            lhs = Expr::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.sum()?;
        let op = match self.peek().map(|s| &s.token) {
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.sum()?;
        if let Some(t) = self.peek() {
            if matches!(
                t.token,
                Token::Gt | Token::Ge | Token::Lt | Token::Le | Token::EqEq | Token::Ne
            ) {
                return Err(ParseError::at(
                    t.offset,
                    "comparisons cannot be chained; combine them with AND",
                ));
            }
        }
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.product()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().map(|s| &s.token) {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let Some(spanned) = self.next() else {
            return Err(ParseError::at(offset, "unexpected end of condition"));
        };
        match spanned.token {
            Token::Number(text) => number_literal(&text, offset),
            Token::Dollar => match self.next() {
                Some(Spanned {
                    token: Token::Number(text),
                    offset,
                }) => Decimal::parse(&text)
                    .map(|d| Expr::Literal(FactValue::Currency(d)))
                    .map_err(|e| ParseError::at(offset, e.to_string())),
                _ => Err(ParseError::at(offset, "expected an amount after \"$\"")),
            },
            Token::True => Ok(Expr::Literal(FactValue::Boolean(true))),
            Token::False => Ok(Expr::Literal(FactValue::Boolean(false))),
            Token::Ident(name) => MetricName::new(name)
                .map(Expr::Fact)
                .map_err(|e| ParseError::at(offset, e.to_string())),
            Token::LParen => {
                self.descend()?;
                let inner = self.or()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(ParseError::at(self.offset(), "expected \")\""));
                }
                Ok(inner)
            }
            other => Err(ParseError::at(
                offset,
                format!("unexpected {}", other.describe()),
            )),
        }
    }
}

fn number_literal(text: &str, offset: usize) -> Result<Expr, ParseError> {
    if text.contains('.') {
        Decimal::parse(text)
            .map(|d| Expr::Literal(FactValue::Decimal(d)))
            .map_err(|e| ParseError::at(offset, e.to_string()))
    } else {
        text.parse::<i64>()
            .map(|i| Expr::Literal(FactValue::Integer(i)))
            .map_err(|_| ParseError::at(offset, format!("integer {text} out of range")))
    }
}
