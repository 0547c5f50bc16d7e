//! Denial-constraint relaxation.
//!
//! Relaxing one side of a predicate replaces it with the candidate-value
//! column of the candidate table, bound to the cell (row, attribute) the
//! relaxed operand referred to. The remaining predicates of the constraint
//! are kept verbatim as a residual filter.
//!
//! Enumeration order is constraint order, then predicate order, then right
//! side before left side. Feature indices are assigned in this order, so it
//! must not change between the training and inference passes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::columns;
use crate::ast::{compile_expr, parse_comparison, BinaryOperator, Comparison, Expression, Literal};
use crate::constraint::{counterpart_alias, ConstraintSet, Operand, Predicate, Side};
use crate::error::{FeaturizeError, Result};

/// Identifies a relaxation by position within the constraint set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelaxationKey {
    pub constraint: String,
    pub predicate: usize,
    pub side: Side,
}

impl fmt::Display for RelaxationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}:{}", self.constraint, self.predicate, self.side)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxedConstraint {
    pub key: RelaxationKey,
    /// Every other predicate of the constraint, verbatim, in order.
    pub residual: Vec<Expression>,
    /// Row binding, attribute filter and rebound comparison, ANDed.
    pub relaxed_join: Expression,
    /// The tuple alias that was not relaxed; counted by the feature query.
    pub counterpart_alias: &'static str,
    pub source_attribute: String,
}

impl RelaxedConstraint {
    pub fn residual_text(&self) -> String {
        self.residual
            .iter()
            .map(compile_expr)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn relaxed_join_text(&self) -> String {
        compile_expr(&self.relaxed_join)
    }

    /// Relaxed join followed by the residual predicates.
    ///
    /// References only the candidate alias, never a physical table, so it is
    /// identical across training and inference passes.
    pub fn defining_expression(&self) -> String {
        let mut text = self.relaxed_join_text();
        for residual in &self.residual {
            text.push_str(" AND ");
            text.push_str(&compile_expr(residual));
        }
        text
    }
}

pub struct Relaxer {
    candidate_alias: String,
}

impl Relaxer {
    pub fn new(candidate_alias: impl Into<String>) -> Self {
        Self {
            candidate_alias: candidate_alias.into(),
        }
    }

    /// Relax every constraint in the set, in parse order.
    pub fn relax_all(&self, constraints: &ConstraintSet) -> Result<Vec<RelaxedConstraint>> {
        let mut relaxed = Vec::new();
        for name in constraints.names() {
            relaxed.extend(self.relax_constraint(constraints, name)?);
        }
        debug!(
            constraints = constraints.len(),
            relaxations = relaxed.len(),
            "relaxed constraint set"
        );
        Ok(relaxed)
    }

    /// Relax the constraint registered under `name`.
    pub fn relax_constraint(
        &self,
        constraints: &ConstraintSet,
        name: &str,
    ) -> Result<Vec<RelaxedConstraint>> {
        let predicates = constraints.predicates(name)?;
        let checked = predicates
            .iter()
            .map(check_predicate)
            .collect::<Result<Vec<_>>>()?;

        let mut relaxed = Vec::new();
        for (index, (predicate, comparison)) in predicates.iter().zip(&checked).enumerate() {
            let shape = predicate.decode_shape()?;
            for &side in shape.sides() {
                let residual = checked
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| i != index)
                    .map(|(_, c)| c.fragment.clone())
                    .collect();
                let (relaxed_join, alias, attribute) =
                    self.relax_side(predicate, comparison, side)?;
                debug!(
                    constraint = name,
                    predicate = index,
                    %side,
                    attribute = %attribute,
                    "relaxed predicate"
                );
                relaxed.push(RelaxedConstraint {
                    key: RelaxationKey {
                        constraint: name.to_string(),
                        predicate: index,
                        side,
                    },
                    residual,
                    relaxed_join,
                    counterpart_alias: counterpart_alias(alias),
                    source_attribute: attribute,
                });
            }
        }
        Ok(relaxed)
    }

    fn relax_side(
        &self,
        predicate: &Predicate,
        comparison: &Comparison,
        side: Side,
    ) -> Result<(Expression, &'static str, String)> {
        let (alias, attribute) = match operand(comparison, side) {
            Operand::Attribute { alias, name } => (*alias, name.clone()),
            Operand::Constant(_) => {
                return Err(FeaturizeError::InvalidOperand {
                    predicate: predicate.source_text.clone(),
                    operand: predicate.operand(side).trim().to_string(),
                })
            }
        };

        let candidate = &self.candidate_alias;
        let row_binding = Expression::binary(
            Expression::column(candidate.as_str(), columns::ROW_ID),
            BinaryOperator::Eq,
            Expression::column(alias, columns::ROW_ID),
        );
        let attribute_filter = Expression::binary(
            Expression::column(candidate.as_str(), columns::ATTR_NAME),
            BinaryOperator::Eq,
            Expression::Literal(Literal::String(attribute.clone())),
        );

        let candidate_value = Expression::column(candidate.as_str(), columns::ATTR_VAL);
        let fixed = operand_expr(operand(comparison, opposite(side)));
        let op = comparison.operator.to_sql();
        let rebound = match side {
            Side::Left => Expression::binary(candidate_value, op, fixed),
            Side::Right => Expression::binary(fixed, op, candidate_value),
        };

        let join = Expression::binary(
            Expression::binary(row_binding, BinaryOperator::And, attribute_filter),
            BinaryOperator::And,
            rebound,
        );
        Ok((join, alias, attribute))
    }
}

/// Parse the source text and both operand fields, and require that they
/// describe the same comparison.
fn check_predicate(predicate: &Predicate) -> Result<Comparison> {
    let comparison = parse_comparison(&predicate.source_text)?;

    let field = |side: Side| {
        let text = predicate.operand(side);
        Operand::parse(text).map_err(|_| FeaturizeError::InvalidOperand {
            predicate: predicate.source_text.clone(),
            operand: text.trim().to_string(),
        })
    };
    let left = field(Side::Left)?;
    let right = field(Side::Right)?;

    if left != comparison.left
        || right != comparison.right
        || predicate.operator != comparison.operator
    {
        return Err(FeaturizeError::InvalidPredicateText {
            text: predicate.source_text.clone(),
            reason: format!(
                "does not match operands `{} {} {}`",
                predicate.left.trim(),
                predicate.operator,
                predicate.right.trim()
            ),
        });
    }
    Ok(comparison)
}

fn operand(comparison: &Comparison, side: Side) -> &Operand {
    match side {
        Side::Left => &comparison.left,
        Side::Right => &comparison.right,
    }
}

fn opposite(side: Side) -> Side {
    match side {
        Side::Left => Side::Right,
        Side::Right => Side::Left,
    }
}

fn operand_expr(operand: &Operand) -> Expression {
    match operand {
        Operand::Attribute { alias, name } => Expression::column(*alias, name.as_str()),
        Operand::Constant(literal) => Expression::Literal(literal.clone()),
    }
}
