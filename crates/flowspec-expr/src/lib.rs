//! Reference expression language for flowspec.
//!
//! [`ExprCompiler`] implements the core [`ExpressionCompiler`] seam: it parses
//! text once into an AST and returns an accessor closure that evaluates the
//! AST against a datum. Library calls are checked against the scope's bound
//! library at compile time and dispatched through it at evaluation time, so
//! scope-aware functions see the scope the expression was resolved in.

pub mod error;
pub mod eval;
pub mod lexer;
pub mod library;
pub mod parser;

use std::rc::Rc;

use flowspec_core::{AccessorFn, BoundLibrary, ExpressionCompiler, ExpressionError};
use serde_json::Value;

pub use error::ExprError;
pub use library::StandardLibrary;
pub use parser::{parse, Expr};

use eval::Evaluator;

#[derive(Debug, Default, Clone, Copy)]
pub struct ExprCompiler;

impl ExprCompiler {
    pub fn new() -> Self {
        ExprCompiler
    }

    /// Parses `text` and checks its calls against `library`.
    pub fn check(&self, text: &str, library: Option<&BoundLibrary>) -> Result<Expr, ExprError> {
        let expr = parse(text)?;
        if let Some(lib) = library {
            if let Some((name, offset)) = expr.calls().into_iter().find(|(n, _)| !lib.contains(n)) {
                return Err(ExprError::UnknownFunction {
                    name: name.to_string(),
                    offset,
                });
            }
        }
        Ok(expr)
    }
}

impl ExpressionCompiler for ExprCompiler {
    fn compile(&self, text: &str, library: Option<&BoundLibrary>) -> Result<Box<AccessorFn>, ExpressionError> {
        let expr = Rc::new(self.check(text, library)?);
        tracing::trace!(expr = %text, "parsed expression");
        let library = library.cloned();
        Ok(Box::new(move |datum: &Value| {
            Evaluator {
                datum,
                library: library.as_ref(),
            }
            .eval(&expr)
        }))
    }
}
