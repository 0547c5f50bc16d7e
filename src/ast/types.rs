//! Query AST for synthesized feature queries.
//!
//! Feature queries and catalog statements are assembled as AST nodes and
//! rendered by the compiler, never spliced together as raw strings. The only
//! raw text that reaches the output is predicate source text and numeric
//! tokens, admitted through [`Expression::Fragment`] and [`Literal::Number`]
//! after validation by the parser.

/// Top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Box<SelectQuery>),
    Insert(InsertQuery),
}

/// A SELECT query with the clauses feature queries need.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub projections: Vec<SelectItem>,
    pub from: Vec<TableRef>,
    pub filter: Option<Expression>,
    pub group_by: Vec<Expression>,
}

/// A single item in the SELECT projection list: `expr [AS alias]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expression,
    pub alias: Option<String>,
}

/// Table reference in FROM clause: `name AS alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Qualified column reference: `table.column`.
    Column { table: String, name: String },
    Literal(Literal),
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    /// Function or aggregate call: `COUNT(expr)`, `COALESCE(a, b)`.
    Function { name: String, args: Vec<Expression> },
    /// Validated predicate source text, emitted verbatim.
    Fragment(String),
}

impl Expression {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::Column {
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Function {
            name: name.into(),
            args,
        }
    }

    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Left-folds the expressions into an AND chain. Returns `None` when empty.
    pub fn conjunction(exprs: impl IntoIterator<Item = Expression>) -> Option<Self> {
        exprs
            .into_iter()
            .reduce(|acc, next| Expression::binary(acc, BinaryOperator::And, next))
    }
}

/// Literal values in SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    /// Numeric token exactly as the parser read it (`02134`, `1e400`).
    Number(String),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
}

/// INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expression>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_select_query() {
        let q = SelectQuery::default();
        assert!(q.projections.is_empty());
        assert!(q.from.is_empty());
        assert!(q.filter.is_none());
        assert!(q.group_by.is_empty());
    }

    #[test]
    fn test_conjunction_empty() {
        assert_eq!(Expression::conjunction(Vec::new()), None);
    }

    #[test]
    fn test_conjunction_single_is_unwrapped() {
        let col = Expression::column("t", "a");
        assert_eq!(Expression::conjunction(vec![col.clone()]), Some(col));
    }

    #[test]
    fn test_conjunction_is_left_folded() {
        let a = Expression::Fragment("a = 1".into());
        let b = Expression::Fragment("b = 2".into());
        let c = Expression::Fragment("c = 3".into());
        let folded = Expression::conjunction(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        let expected = Expression::binary(
            Expression::binary(a, BinaryOperator::And, b),
            BinaryOperator::And,
            c,
        );
        assert_eq!(folded, expected);
    }

    #[test]
    fn test_literal_equality() {
        assert_ne!(Literal::Integer(1), Literal::Integer(2));
        assert_ne!(Literal::Number("02134".into()), Literal::Number("2134".into()));
        assert_eq!(
            Literal::String("zip".into()),
            Literal::String("zip".into())
        );
    }
}
