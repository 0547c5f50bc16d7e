/// SQL validation built on `sqlparser`.
///
/// Predicate source text arrives from the external constraint parser and is
/// embedded verbatim in feature queries. It is admitted only if it parses as
/// exactly one comparison between tuple attributes and literals, which keeps
/// statement separators, subqueries and boolean connectives out of generated
/// SQL. Operands are held to the same grammar.
use anyhow::{anyhow, Result};
use sqlparser::ast as sp;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;
use sqlparser::tokenizer::Token;

use super::types::{Expression, Literal};
use crate::constraint::{Operand, Operator, TUPLE1, TUPLE2};
use crate::error::FeaturizeError;

/// Parse a SQL string into `sqlparser` statements.
pub fn parse_sql(sql: &str) -> Result<Vec<sp::Statement>> {
    let dialect = PostgreSqlDialect {};
    SqlParser::parse_sql(&dialect, sql).map_err(|e| anyhow!("SQL parse error: {}", e))
}

/// Parse a single SQL statement. Returns an error if the input contains
/// more than one statement.
pub fn parse_single(sql: &str) -> Result<sp::Statement> {
    let mut statements = parse_sql(sql)?;
    if statements.len() != 1 {
        return Err(anyhow!("Expected 1 statement, found {}", statements.len()));
    }
    Ok(statements.remove(0))
}

/// A predicate comparison admitted by [`parse_comparison`].
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// The trimmed source text as a verbatim fragment.
    pub fragment: Expression,
    pub left: Operand,
    pub operator: Operator,
    pub right: Operand,
}

/// Validate predicate source text and wrap it as a verbatim fragment.
pub fn parse_comparison(text: &str) -> Result<Comparison, FeaturizeError> {
    let invalid = |reason: String| FeaturizeError::InvalidPredicateText {
        text: text.to_string(),
        reason,
    };

    match parse_whole_expr(text).map_err(invalid)? {
        sp::Expr::BinaryOp { left, op, right } => {
            let operator = comparison_operator(&op)
                .ok_or_else(|| invalid(format!("`{}` is not a comparison operator", op)))?;
            Ok(Comparison {
                fragment: Expression::Fragment(text.trim().to_string()),
                left: classify_operand(&left).map_err(invalid)?,
                operator,
                right: classify_operand(&right).map_err(invalid)?,
            })
        }
        other => Err(invalid(format!("`{}` is not a binary comparison", other))),
    }
}

/// Parse one predicate operand: `tuple1.<attr>`, `tuple2.<attr>`, a number or
/// a single-quoted string. The error is the reason the text was refused.
pub fn parse_operand(text: &str) -> Result<Operand, String> {
    let expr = parse_whole_expr(text)?;
    classify_operand(&expr)
}

fn parse_whole_expr(text: &str) -> Result<sp::Expr, String> {
    let dialect = PostgreSqlDialect {};
    let mut parser = SqlParser::new(&dialect)
        .try_with_sql(text)
        .map_err(|e| e.to_string())?;
    let expr = parser.parse_expr().map_err(|e| e.to_string())?;

    let next = parser.peek_token();
    if next.token != Token::EOF {
        return Err(format!("unexpected trailing token `{}`", next.token));
    }
    Ok(expr)
}

fn comparison_operator(op: &sp::BinaryOperator) -> Option<Operator> {
    match op {
        sp::BinaryOperator::Eq => Some(Operator::Eq),
        sp::BinaryOperator::NotEq => Some(Operator::Neq),
        sp::BinaryOperator::Lt => Some(Operator::Lt),
        sp::BinaryOperator::LtEq => Some(Operator::Leq),
        sp::BinaryOperator::Gt => Some(Operator::Gt),
        sp::BinaryOperator::GtEq => Some(Operator::Geq),
        _ => None,
    }
}

fn classify_operand(expr: &sp::Expr) -> Result<Operand, String> {
    match expr {
        sp::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [alias, name] => {
                let alias = match (alias.quote_style, alias.value.as_str()) {
                    (None, TUPLE1) => TUPLE1,
                    (None, TUPLE2) => TUPLE2,
                    _ => return Err(format!("`{}` is not a tuple alias", alias)),
                };
                if name.quote_style.is_some() || !is_plain_identifier(&name.value) {
                    return Err(format!("`{}` is not a plain attribute name", name));
                }
                Ok(Operand::Attribute {
                    alias,
                    name: name.value.clone(),
                })
            }
            _ => Err(format!("`{}` is not a tuple attribute", expr)),
        },
        sp::Expr::Value(sp::Value::Number(token, _)) => {
            Ok(Operand::Constant(Literal::Number(token.clone())))
        }
        sp::Expr::Value(sp::Value::SingleQuotedString(s)) => {
            Ok(Operand::Constant(Literal::String(s.clone())))
        }
        sp::Expr::UnaryOp {
            op: sp::UnaryOperator::Minus,
            expr: inner,
        } => match inner.as_ref() {
            sp::Expr::Value(sp::Value::Number(token, _)) => {
                Ok(Operand::Constant(Literal::Number(format!("-{}", token))))
            }
            _ => Err(format!("`{}` is not a numeric literal", expr)),
        },
        sp::Expr::Nested(inner) => classify_operand(inner),
        other => Err(format!("`{}` is not a tuple attribute or literal", other)),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
