//! Error types for flowspec-expr.

use flowspec_core::ExpressionError;
use thiserror::Error;

/// Failures raised while compiling expression text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unrecognized input `{text}` at offset {offset}")]
    Lex { text: String, offset: usize },

    #[error("expected {expected}, found `{found}` at offset {offset}")]
    Unexpected {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("expected {expected}, found end of input")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown function `{name}` at offset {offset}")]
    UnknownFunction { name: String, offset: usize },

    #[error("expression nests deeper than {limit} levels at offset {offset}")]
    TooDeep { limit: usize, offset: usize },
}

impl ExprError {
    /// Byte offset of the failure, when it has one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            ExprError::Lex { offset, .. }
            | ExprError::Unexpected { offset, .. }
            | ExprError::UnknownFunction { offset, .. }
            | ExprError::TooDeep { offset, .. } => Some(*offset),
            ExprError::UnexpectedEnd { .. } => None,
        }
    }
}

impl From<ExprError> for ExpressionError {
    fn from(err: ExprError) -> Self {
        match err.offset() {
            Some(offset) => ExpressionError::at(err.to_string(), offset),
            None => ExpressionError::new(err.to_string()),
        }
    }
}
