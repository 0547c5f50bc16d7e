//! Denial-constraint model as delivered by the external constraint parser.
//!
//! A constraint is a conjunction of pairwise predicates over two copies of the
//! base table, aliased [`TUPLE1`] and [`TUPLE2`]. Predicate order is kept
//! exactly as parsed because it drives relaxation order and therefore feature
//! numbering.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ast::{parse_operand, BinaryOperator, Literal};
use crate::error::{FeaturizeError, Result};

/// Alias of the first tuple in a pairwise comparison.
pub const TUPLE1: &str = "tuple1";
/// Alias of the second tuple in a pairwise comparison.
pub const TUPLE2: &str = "tuple2";

/// Returns the other of the two tuple aliases.
pub fn counterpart_alias(alias: &str) -> &'static str {
    if alias == TUPLE1 {
        TUPLE2
    } else {
        TUPLE1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<>", alias = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Leq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Geq,
}

impl Operator {
    pub fn to_sql(self) -> BinaryOperator {
        match self {
            Operator::Eq => BinaryOperator::Eq,
            Operator::Neq => BinaryOperator::NotEq,
            Operator::Lt => BinaryOperator::Lt,
            Operator::Leq => BinaryOperator::LtEq,
            Operator::Gt => BinaryOperator::Gt,
            Operator::Geq => BinaryOperator::GtEq,
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "=" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Neq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Leq),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Geq),
            other => Err(format!("unknown comparison operator `{}`", other)),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::ast::compiler::operator_str(self.to_sql()))
    }
}

/// Which operand(s) of a predicate may be rebound to candidate values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateShape {
    BothRelaxable,
    RightOnlyRelaxable,
    LeftOnlyRelaxable,
}

impl PredicateShape {
    /// Numeric tag used by the constraint parser.
    pub fn code(self) -> u8 {
        match self {
            PredicateShape::BothRelaxable => 0,
            PredicateShape::RightOnlyRelaxable => 1,
            PredicateShape::LeftOnlyRelaxable => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PredicateShape::BothRelaxable),
            1 => Some(PredicateShape::RightOnlyRelaxable),
            2 => Some(PredicateShape::LeftOnlyRelaxable),
            _ => None,
        }
    }

    /// Sides to relax, right before left.
    pub fn sides(self) -> &'static [Side] {
        match self {
            PredicateShape::BothRelaxable => &[Side::Right, Side::Left],
            PredicateShape::RightOnlyRelaxable => &[Side::Right],
            PredicateShape::LeftOnlyRelaxable => &[Side::Left],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// One side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `<alias>.<attribute>` with alias one of the tuple aliases.
    Attribute { alias: &'static str, name: String },
    Constant(Literal),
}

impl Operand {
    /// Accepts `tuple1.<ident>`, `tuple2.<ident>`, a number or a single-quoted
    /// string; anything else is refused with the reason.
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        parse_operand(text)
    }
}

/// One atomic comparison inside a denial constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Verbatim text of the comparison, e.g. `tuple1.zip = tuple2.zip`.
    pub source_text: String,
    pub operator: Operator,
    pub left: String,
    pub right: String,
    /// Shape tag as emitted by the parser; decoded during relaxation.
    pub shape: u8,
}

impl Predicate {
    pub fn new(
        source_text: impl Into<String>,
        operator: Operator,
        left: impl Into<String>,
        right: impl Into<String>,
        shape: PredicateShape,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            operator,
            left: left.into(),
            right: right.into(),
            shape: shape.code(),
        }
    }

    /// Pairwise predicate `tuple1.<attr> <op> tuple2.<attr>`.
    pub fn pairwise(attribute: &str, operator: Operator, shape: PredicateShape) -> Self {
        let left = format!("{}.{}", TUPLE1, attribute);
        let right = format!("{}.{}", TUPLE2, attribute);
        let source_text = format!("{} {} {}", left, operator, right);
        Self::new(source_text, operator, left, right, shape)
    }

    pub fn decode_shape(&self) -> Result<PredicateShape> {
        PredicateShape::from_code(self.shape).ok_or_else(|| {
            FeaturizeError::InvalidPredicateShape {
                predicate: self.source_text.clone(),
                code: self.shape,
            }
        })
    }

    pub fn operand(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenialConstraint {
    pub name: String,
    pub predicates: Vec<Predicate>,
}

impl DenialConstraint {
    pub fn new(name: impl Into<String>, predicates: Vec<Predicate>) -> Self {
        Self {
            name: name.into(),
            predicates,
        }
    }
}

/// Constraints in parse order with a name index.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<DenialConstraint>,
    by_name: HashMap<String, usize>,
}

impl ConstraintSet {
    pub fn new(constraints: Vec<DenialConstraint>) -> Self {
        let by_name = constraints
            .iter()
            .enumerate()
            .map(|(i, dc)| (dc.name.clone(), i))
            .collect();
        Self {
            constraints,
            by_name,
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let constraints: Vec<DenialConstraint> = serde_json::from_str(json)?;
        Ok(Self::new(constraints))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constraints.iter().map(|dc| dc.name.as_str())
    }

    pub fn predicates(&self, name: &str) -> Result<&[Predicate]> {
        self.by_name
            .get(name)
            .map(|&i| self.constraints[i].predicates.as_slice())
            .ok_or_else(|| FeaturizeError::UnknownConstraint(name.to_string()))
    }

    pub fn constraints(&self) -> &[DenialConstraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}
