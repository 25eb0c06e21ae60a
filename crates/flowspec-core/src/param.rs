//! Resolved parameter values.

use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::accessor::{Accessor, Comparator};
use crate::id::OperatorId;
use crate::subflow::Subflow;

/// Parameter name to resolved value, in declaration order.
pub type Parameters = IndexMap<String, Parameter>;

/// The outcome of resolving one parameter value.
#[derive(Debug, Clone)]
pub enum Parameter {
    /// Unmarked values pass through untouched.
    Literal(Value),
    Operator(OperatorId),
    Accessor(Rc<Accessor>),
    Comparator(Rc<Comparator>),
    /// Deferred factory for a nested specification.
    Subflow(Rc<Subflow>),
    /// Sequence resolved element-wise, order and length preserved.
    Array(Vec<Parameter>),
}

impl Parameter {
    pub fn as_operator(&self) -> Option<OperatorId> {
        match self {
            Parameter::Operator(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_accessor(&self) -> Option<&Rc<Accessor>> {
        match self {
            Parameter::Accessor(acc) => Some(acc),
            _ => None,
        }
    }

    pub fn as_comparator(&self) -> Option<&Rc<Comparator>> {
        match self {
            Parameter::Comparator(cmp) => Some(cmp),
            _ => None,
        }
    }

    pub fn as_subflow(&self) -> Option<&Rc<Subflow>> {
        match self {
            Parameter::Subflow(sub) => Some(sub),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Parameter::Literal(v) => Some(v),
            _ => None,
        }
    }

    /// Renders the parameter as JSON for inspection. Functions and handles are
    /// shown by their markers rather than their behavior.
    pub fn describe(&self) -> Value {
        match self {
            Parameter::Literal(v) => v.clone(),
            Parameter::Operator(id) => json!({ "$operator": id.0 }),
            Parameter::Accessor(acc) => json!({
                "$accessor": acc.name(),
                "fields": acc.fields(),
            }),
            Parameter::Comparator(cmp) => json!({
                "$comparator": cmp.fields(),
                "orders": cmp.orders(),
            }),
            Parameter::Subflow(sub) => json!({
                "$subflow": sub.spec().output().map(|op| op.id.to_string()),
            }),
            Parameter::Array(items) => Value::Array(items.iter().map(Parameter::describe).collect()),
        }
    }
}

/// Renders a whole parameter set with [`Parameter::describe`].
pub fn describe_parameters(params: &Parameters) -> Value {
    Value::Object(
        params
            .iter()
            .map(|(name, p)| (name.clone(), p.describe()))
            .collect(),
    )
}
