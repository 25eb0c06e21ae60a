//! Wire model for dataflow specifications.
//!
//! These are the serde-facing shapes of the declarative tree. They are decoded
//! once and never mutated; reference markers inside parameter values stay as
//! raw JSON until the resolver decodes them into a
//! [`Reference`](crate::reference::Reference).

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::id::SpecId;

/// Behavior tag of the literal-data node kind whose `value` describes
/// initial data rather than parameters.
pub const COLLECT: &str = "Collect";

/// Behavior tag of a plain operator (no transform).
pub const OPERATOR: &str = "Operator";

/// A complete (root or nested) specification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataflowSpec {
    /// Operators in declaration order. Parents precede the children that
    /// reference them.
    #[serde(default)]
    pub operators: Vec<OperatorSpec>,
    /// Event stream definitions.
    #[serde(default)]
    pub streams: Vec<StreamSpec>,
    /// Update listeners wiring streams to operators.
    #[serde(default)]
    pub updates: Vec<UpdateSpec>,
}

impl DataflowSpec {
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// The first declared operator, which is the effective output of a
    /// nested specification.
    pub fn output(&self) -> Option<&OperatorSpec> {
        self.operators.first()
    }
}

/// `{"$ref": id}` as it appears in structural positions (`parent`, `target`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperatorRef {
    #[serde(rename = "$ref")]
    pub id: SpecId,
}

/// One node of the declarative tree.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorSpec {
    pub id: SpecId,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Literal parameters, initial value, or (for `Collect`) inline data.
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    /// Update expression for plain operators.
    #[serde(default)]
    pub update: Option<Value>,
    #[serde(default)]
    pub parent: Option<OperatorRef>,
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub scale: Option<String>,
    /// Dataset name to the role tags this node fills.
    #[serde(default)]
    pub data: Option<IndexMap<String, Vec<String>>>,
    #[serde(default)]
    pub root: bool,
    #[serde(default = "default_react")]
    pub react: bool,
}

fn default_kind() -> String {
    OPERATOR.to_string()
}

fn default_react() -> bool {
    true
}

impl OperatorSpec {
    /// A bare operator with only an id, as a starting point for builders.
    pub fn new(id: impl Into<SpecId>) -> Self {
        OperatorSpec {
            id: id.into(),
            kind: default_kind(),
            value: None,
            params: None,
            update: None,
            parent: None,
            signal: None,
            scale: None,
            data: None,
            root: false,
            react: true,
        }
    }

    pub fn is_collect(&self) -> bool {
        self.kind == COLLECT
    }
}

/// An event stream, either sourced from the engine's event system or derived
/// from another stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSpec {
    pub id: SpecId,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub stream: Option<OperatorRef>,
    #[serde(default)]
    pub filter: Option<Value>,
}

/// Wires a stream (or operator) to a target operator.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSpec {
    /// `{"$ref": id}` or a bare id.
    pub source: Value,
    pub target: OperatorRef,
    #[serde(default)]
    pub update: Option<Value>,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub options: Option<Value>,
}

impl UpdateSpec {
    pub fn source_id(&self) -> Option<SpecId> {
        match &self.source {
            Value::Object(obj) => obj.get("$ref").and_then(SpecId::from_json),
            other => SpecId::from_json(other),
        }
    }
}

/// Initial-data load mode of a `Collect` node, chosen by priority.
#[derive(Debug, Clone, PartialEq)]
pub enum DataLoad<'a> {
    /// Bulk local load handed to the engine's ingest entry point.
    Ingest {
        data: &'a Value,
        format: Option<&'a Value>,
    },
    /// Asynchronous remote fetch.
    Request {
        resource: &'a Value,
        format: Option<&'a Value>,
    },
    /// Literal records inserted synchronously.
    Inline(&'a Value),
}

impl<'a> DataLoad<'a> {
    /// Picks exactly one load mode: `$ingest`, then `$request`, then inline.
    /// Markers holding a falsy value (`null`, `false`, `0` or `""`) count
    /// as absent.
    pub fn select(value: &'a Value) -> Self {
        let marker = |key: &str| value.get(key).filter(|v| truthy(v));
        let format = value.get("$format").filter(|v| !v.is_null());

        if let Some(data) = marker("$ingest") {
            DataLoad::Ingest { data, format }
        } else if let Some(resource) = marker("$request") {
            DataLoad::Request { resource, format }
        } else {
            DataLoad::Inline(value)
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
