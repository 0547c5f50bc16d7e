/// Query AST used to synthesize feature queries.
///
/// ```text
/// Relaxed constraint
///       ↓
/// Query AST          (types.rs)
///       ↓
/// SQL Compiler       (compiler.rs)
///       ↓
/// External query engine
/// ```
///
/// Predicate text and operands supplied by the constraint parser are validated by
/// `parser.rs` before it may appear inside an AST.
pub mod compiler;
pub mod parser;
pub mod types;

pub use compiler::{compile, compile_expr};
pub use parser::{parse_comparison, parse_operand, parse_single, parse_sql, Comparison};
pub use types::*;
