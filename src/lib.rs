pub mod ast;
pub mod catalog;
pub mod config;
pub mod constraint;
pub mod error;
pub mod featurize;
pub mod sink;

pub use error::{FeaturizeError, Result};
