//! The [`Engine`] trait: the contract with the graph engine collaborator.
//!
//! The compiler only builds and wires nodes; scheduling, propagation and
//! asynchronous loading all belong to the engine. Every backend implements
//! this trait so the compiler stays independent of how nodes are stored or
//! run.

use std::rc::Rc;

use serde_json::Value;

use crate::accessor::Accessor;
use crate::error::EngineError;
use crate::id::OperatorId;
use crate::param::Parameters;
use crate::transform::TransformDef;

/// What kind of node the engine should create.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// A plain operator holding a value, optionally recomputed by `update`.
    Operator {
        value: Option<Value>,
        update: Option<Rc<Accessor>>,
    },
    /// A registry-resolved transform.
    Transform(TransformDef),
}

/// A batch of record insertions and removals applied atomically to a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    insert: Vec<Value>,
    remove: Vec<Value>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues records for insertion. An array contributes each element; any
    /// other value is a single record.
    pub fn insert(mut self, records: &Value) -> Self {
        match records {
            Value::Array(items) => self.insert.extend(items.iter().cloned()),
            other => self.insert.push(other.clone()),
        }
        self
    }

    /// Queues records for removal, with the same array rule as [`insert`](Self::insert).
    pub fn remove(mut self, records: &Value) -> Self {
        match records {
            Value::Array(items) => self.remove.extend(items.iter().cloned()),
            other => self.remove.push(other.clone()),
        }
        self
    }

    pub fn inserted(&self) -> &[Value] {
        &self.insert
    }

    pub fn removed(&self) -> &[Value] {
        &self.remove
    }

    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.remove.is_empty()
    }
}

/// Where an event stream draws its events from.
#[derive(Debug, Clone, Default)]
pub struct EventSource {
    /// Event source name (e.g. `"view"`, `"window"`).
    pub source: Option<String>,
    /// Event type (e.g. `"click"`).
    pub kind: Option<String>,
    /// Stream this one is derived from.
    pub parent: Option<OperatorId>,
    pub filter: Option<Rc<Accessor>>,
    /// Operators and functions the filter expression reads.
    pub params: Parameters,
}

/// The value or function an `on` listener applies to its target.
#[derive(Debug, Clone)]
pub enum UpdateFn {
    Value(Value),
    Expression(Rc<Accessor>),
}

/// The graph engine contract.
pub trait Engine {
    /// Creates a node and returns its handle.
    fn add(
        &mut self,
        behavior: Behavior,
        params: Parameters,
        react: bool,
    ) -> Result<OperatorId, EngineError>;

    /// Adds scheduling dependency edges from `parent` to each child.
    fn connect(&mut self, parent: OperatorId, children: &[OperatorId]) -> Result<(), EngineError>;

    /// Records `target` in the target set of `source`, the bookkeeping used
    /// for downstream data propagation.
    fn add_target(&mut self, source: OperatorId, target: OperatorId) -> Result<(), EngineError>;

    /// Registers a listener updating `target` whenever `source` fires.
    fn on(
        &mut self,
        source: OperatorId,
        target: OperatorId,
        update: Option<UpdateFn>,
        params: Parameters,
        options: Option<Value>,
    ) -> Result<(), EngineError>;

    /// Bulk local load.
    fn ingest(&mut self, op: OperatorId, data: &Value, format: Option<&Value>) -> Result<(), EngineError>;

    /// Asynchronous remote fetch. Must not block compilation.
    fn request(
        &mut self,
        op: OperatorId,
        resource: &Value,
        format: Option<&Value>,
    ) -> Result<(), EngineError>;

    /// Applies a changeset to a node.
    fn pulse(&mut self, op: OperatorId, changes: Changeset) -> Result<(), EngineError>;

    /// Starts a new changeset.
    fn changeset(&self) -> Changeset {
        Changeset::new()
    }

    /// Creates an event stream node.
    fn events(&mut self, source: EventSource) -> Result<OperatorId, EngineError>;
}
