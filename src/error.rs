use thiserror::Error;

/// Failures raised while relaxing constraints and synthesizing feature queries.
#[derive(Debug, Error)]
pub enum FeaturizeError {
    /// A predicate carried a shape code other than 0, 1 or 2.
    #[error("predicate `{predicate}` has invalid shape code {code} (expected 0, 1 or 2)")]
    InvalidPredicateShape { predicate: String, code: u8 },

    #[error("no predicates registered for denial constraint `{0}`")]
    UnknownConstraint(String),

    /// An operand is neither a tuple attribute with a plain identifier name nor
    /// a literal, or it is a literal chosen for relaxation.
    #[error("operand `{operand}` of predicate `{predicate}` is not usable")]
    InvalidOperand { predicate: String, operand: String },

    /// Predicate source text is not a single comparison expression, or
    /// disagrees with the predicate's operand fields.
    #[error("predicate text `{text}` is not a usable comparison: {reason}")]
    InvalidPredicateText { text: String, reason: String },

    #[error("feature catalog read failed: {0}")]
    CatalogReadFailed(String),

    #[error("feature catalog write failed: {0}")]
    CatalogWriteFailed(String),

    /// Inference indices cannot be aligned with the training-mode catalog.
    #[error("feature catalog is misaligned with the constraint set: {0}")]
    CatalogMisaligned(String),

    #[error("query sink rejected submission: {0}")]
    SinkSubmissionFailed(String),
}

pub type Result<T> = std::result::Result<T, FeaturizeError>;
