//! Error types for flowspec-core.
//!
//! Uses `thiserror` for structured, matchable variants. Every compile failure
//! aborts the current pass; the driver wraps errors with the id of the
//! specification entry being compiled so authoring mistakes stay traceable.

use thiserror::Error;

use crate::id::{OperatorId, ScopeId, SpecId};

/// Errors produced while compiling a specification into a graph.
#[derive(Debug, Error)]
pub enum CompileError {
    /// An operator reference named an id not visible in the scope chain.
    #[error("operator not defined: {id}")]
    UnresolvedReference { id: SpecId },

    /// A `parent` reference named an id that has not been registered yet.
    #[error("parent operator {parent} of {id} is not registered")]
    UnknownParent { id: SpecId, parent: SpecId },

    /// A reference marker carried a value of the wrong shape.
    #[error("malformed {marker} reference: {reason}")]
    MalformedReference { marker: &'static str, reason: String },

    /// A subflow specification declared no operators, so it has no output.
    #[error("subflow specification declares no operators")]
    EmptySubflow,

    /// Subflow nesting went deeper than the configured limit.
    #[error("subflow nesting depth limit ({limit}) exceeded")]
    SubflowDepthExceeded { limit: usize },

    /// A scope id does not address a frame in the scope tree.
    #[error("scope not found: ScopeId({id})", id = id.0)]
    ScopeNotFound { id: ScopeId },

    /// Expression text failed to compile.
    #[error("invalid expression `{text}`: {source}")]
    Expression {
        text: String,
        #[source]
        source: ExpressionError,
    },

    /// A field path could not be parsed.
    #[error("invalid field path `{path}`: {reason}")]
    FieldPath { path: String, reason: String },

    /// The engine rejected a call.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An embedded specification could not be decoded.
    #[error("specification decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Wraps any failure with the specification entry that raised it.
    #[error("in {id}: {source}")]
    InOperator {
        id: SpecId,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Attaches the offending specification id, once. Errors already carrying
    /// an id (raised inside a nested subflow, for instance) keep the innermost.
    pub fn in_operator(self, id: &SpecId) -> Self {
        match self {
            already @ CompileError::InOperator { .. } => already,
            other => CompileError::InOperator {
                id: id.clone(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost error, unwrapping any `InOperator` context.
    pub fn root_cause(&self) -> &CompileError {
        match self {
            CompileError::InOperator { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors reported by an [`Engine`](crate::engine::Engine) implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The handle does not name a node owned by this engine.
    #[error("unknown operator: OperatorId({id})", id = id.0)]
    UnknownOperator { id: OperatorId },

    /// A data load was rejected (bad format hint, undecodable payload).
    #[error("load failed for operator {id}: {reason}")]
    Load { id: OperatorId, reason: String },

    /// Scheduling edges and target sets disagree.
    #[error("graph inconsistency: {reason}")]
    Inconsistent { reason: String },
}

/// Failure reported by an [`ExpressionCompiler`](crate::expression::ExpressionCompiler).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExpressionError {
    pub message: String,
    /// Byte offset into the expression text, when known.
    pub offset: Option<usize>,
}

impl ExpressionError {
    pub fn new(message: impl Into<String>) -> Self {
        ExpressionError {
            message: message.into(),
            offset: None,
        }
    }

    pub fn at(message: impl Into<String>, offset: usize) -> Self {
        ExpressionError {
            message: message.into(),
            offset: Some(offset),
        }
    }
}
