//! Reference resolution.
//!
//! Turns marked parameter values into concrete handles and functions.
//! Expression, field and comparator functions are memoized in the scope's
//! function table, so the same spec resolved twice in a scope (or any of its
//! descendants) yields the very same `Rc`.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::accessor::{self, Accessor};
use crate::engine::Engine;
use crate::error::CompileError;
use crate::id::ScopeId;
use crate::param::{Parameter, Parameters};
use crate::reference::{expression_params, ExpressionRef, Reference};
use crate::runtime::Runtime;
use crate::scope::{Function, MemoKey};
use crate::subflow::Subflow;

impl<E: Engine> Runtime<E> {
    /// Resolves a flat parameter mapping into a fresh parameter set.
    pub fn resolve_parameters(
        &mut self,
        spec: &Map<String, Value>,
        scope: ScopeId,
    ) -> Result<Parameters, CompileError> {
        let mut params = Parameters::new();
        self.resolve_parameters_into(spec, scope, &mut params)?;
        Ok(params)
    }

    /// Resolves `spec` into `params`.
    ///
    /// An expression parameter object first merges its own `$params` into the
    /// same accumulator, so the expression's dependencies become siblings of
    /// the parameter that uses them. Later names overwrite earlier ones.
    pub fn resolve_parameters_into(
        &mut self,
        spec: &Map<String, Value>,
        scope: ScopeId,
        params: &mut Parameters,
    ) -> Result<(), CompileError> {
        for (name, value) in spec {
            if let Some(nested) = expression_params(value) {
                self.resolve_parameters_into(nested, scope, params)?;
            }
            let resolved = self.resolve(value, scope)?;
            params.insert(name.clone(), resolved);
        }
        Ok(())
    }

    /// Resolves one parameter value. Arrays resolve element-wise.
    pub fn resolve(&mut self, value: &Value, scope: ScopeId) -> Result<Parameter, CompileError> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_one(item, scope))
                .collect::<Result<Vec<_>, _>>()
                .map(Parameter::Array),
            other => self.resolve_one(other, scope),
        }
    }

    pub(crate) fn resolve_one(&mut self, value: &Value, scope: ScopeId) -> Result<Parameter, CompileError> {
        match Reference::decode(value)? {
            None => Ok(Parameter::Literal(value.clone())),
            Some(reference) => self.resolve_reference(reference, scope),
        }
    }

    /// Dispatches a decoded reference.
    pub fn resolve_reference(
        &mut self,
        reference: Reference,
        scope: ScopeId,
    ) -> Result<Parameter, CompileError> {
        match reference {
            Reference::Operator(id) => self.lookup(scope, &id).map(Parameter::Operator),
            Reference::Expression(expr) => self.expression(expr, scope).map(Parameter::Accessor),
            Reference::Field { path, name } => {
                let key = MemoKey::Field {
                    path: path.clone(),
                    name: name.clone(),
                };
                if let Some(Function::Accessor(acc)) = self.scopes().function(scope, &key) {
                    tracing::trace!(field = %path, "memo hit");
                    return Ok(Parameter::Accessor(acc));
                }
                let acc = Rc::new(accessor::field(&path, name.as_deref())?);
                self.scopes_mut()
                    .set_function(scope, key, Function::Accessor(Rc::clone(&acc)))?;
                Ok(Parameter::Accessor(acc))
            }
            Reference::Compare { fields, orders } => {
                let key = MemoKey::Compare {
                    fields: fields.clone(),
                    orders: orders.clone(),
                };
                if let Some(Function::Comparator(cmp)) = self.scopes().function(scope, &key) {
                    tracing::trace!(fields = ?fields, "memo hit");
                    return Ok(Parameter::Comparator(cmp));
                }
                let cmp = Rc::new(accessor::compare(&fields, &orders)?);
                self.scopes_mut()
                    .set_function(scope, key, Function::Comparator(Rc::clone(&cmp)))?;
                Ok(Parameter::Comparator(cmp))
            }
            Reference::Subflow(spec) => {
                tracing::debug!(scope = %scope, operators = spec.operators.len(), "deferred subflow");
                Ok(Parameter::Subflow(Rc::new(Subflow::new(spec, scope))))
            }
        }
    }

    fn expression(&mut self, expr: ExpressionRef, scope: ScopeId) -> Result<Rc<Accessor>, CompileError> {
        let key = MemoKey::Expression(expr.text.clone());
        if let Some(Function::Accessor(acc)) = self.scopes().function(scope, &key) {
            tracing::trace!(expr = %expr.text, "memo hit");
            return Ok(acc);
        }

        let body = self
            .expressions
            .compile(&expr.text, self.scopes().library(scope))
            .map_err(|source| CompileError::Expression {
                text: expr.text.clone(),
                source,
            })?;
        let acc = Rc::new(Accessor::new(body, expr.fields, expr.name));
        self.scopes_mut()
            .set_function(scope, key, Function::Accessor(Rc::clone(&acc)))?;
        tracing::debug!(expr = %expr.text, scope = %scope, "compiled expression");
        Ok(acc)
    }

    /// Resolves a value that must denote a function (operator `update`,
    /// stream `filter`). Nested `$params` are merged into `params`.
    pub(crate) fn resolve_function(
        &mut self,
        value: &Value,
        scope: ScopeId,
        params: &mut Parameters,
        role: &'static str,
    ) -> Result<Rc<Accessor>, CompileError> {
        if let Some(nested) = expression_params(value) {
            self.resolve_parameters_into(nested, scope, params)?;
        }
        match self.resolve_one(value, scope)? {
            Parameter::Accessor(acc) => Ok(acc),
            _ => Err(CompileError::MalformedReference {
                marker: role,
                reason: "expected an expression or field reference".to_string(),
            }),
        }
    }
}
