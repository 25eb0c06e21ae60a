//! In-crate test doubles: an engine that records every call and a minimal
//! expression compiler.

use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::accessor::AccessorFn;
use crate::engine::{Behavior, Changeset, Engine, EventSource, UpdateFn};
use crate::error::{EngineError, ExpressionError};
use crate::expression::{BoundLibrary, ExpressionCompiler, FunctionLibrary, ScopeContext};
use crate::id::OperatorId;
use crate::param::Parameters;
use crate::runtime::Runtime;
use crate::transform::{TransformDef, TransformRegistry};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Add(OperatorId),
    Connect(OperatorId, Vec<OperatorId>),
    AddTarget(OperatorId, OperatorId),
    Ingest(OperatorId, Value, Option<Value>),
    Request(OperatorId, Value, Option<Value>),
    Pulse(OperatorId, Changeset),
    On(OperatorId, OperatorId),
    Events(OperatorId),
}

#[derive(Debug)]
pub(crate) struct Listener {
    pub source: OperatorId,
    pub target: OperatorId,
    pub update: Option<UpdateFn>,
    pub params: Parameters,
    pub options: Option<Value>,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingEngine {
    pub calls: Vec<Call>,
    pub listeners: Vec<Listener>,
    nodes: IndexMap<OperatorId, (Behavior, Parameters)>,
    streams: IndexMap<OperatorId, EventSource>,
    targets: IndexMap<OperatorId, Vec<OperatorId>>,
    next: u32,
    compiled: Rc<Cell<usize>>,
}

impl RecordingEngine {
    fn allocate(&mut self) -> OperatorId {
        let id = OperatorId(self.next);
        self.next += 1;
        id
    }

    fn known(&self, op: OperatorId) -> Result<(), EngineError> {
        if self.nodes.contains_key(&op) || self.streams.contains_key(&op) {
            Ok(())
        } else {
            Err(EngineError::UnknownOperator { id: op })
        }
    }

    pub fn targets_of(&self, op: OperatorId) -> Vec<OperatorId> {
        self.targets.get(&op).cloned().unwrap_or_default()
    }

    pub fn params(&self, op: OperatorId) -> &Parameters {
        &self.nodes[&op].1
    }

    pub fn behavior(&self, op: OperatorId) -> &Behavior {
        &self.nodes[&op].0
    }

    pub fn stream(&self, op: OperatorId) -> &EventSource {
        &self.streams[&op]
    }

    pub fn expressions_compiled(&self) -> usize {
        self.compiled.get()
    }
}

impl Engine for RecordingEngine {
    fn add(&mut self, behavior: Behavior, params: Parameters, _react: bool) -> Result<OperatorId, EngineError> {
        let id = self.allocate();
        self.nodes.insert(id, (behavior, params));
        self.calls.push(Call::Add(id));
        Ok(id)
    }

    fn connect(&mut self, parent: OperatorId, children: &[OperatorId]) -> Result<(), EngineError> {
        self.calls.push(Call::Connect(parent, children.to_vec()));
        Ok(())
    }

    fn add_target(&mut self, source: OperatorId, target: OperatorId) -> Result<(), EngineError> {
        self.targets.entry(source).or_default().push(target);
        self.calls.push(Call::AddTarget(source, target));
        Ok(())
    }

    fn on(
        &mut self,
        source: OperatorId,
        target: OperatorId,
        update: Option<UpdateFn>,
        params: Parameters,
        options: Option<Value>,
    ) -> Result<(), EngineError> {
        self.known(source)?;
        self.known(target)?;
        self.calls.push(Call::On(source, target));
        self.listeners.push(Listener {
            source,
            target,
            update,
            params,
            options,
        });
        Ok(())
    }

    fn ingest(&mut self, op: OperatorId, data: &Value, format: Option<&Value>) -> Result<(), EngineError> {
        self.calls
            .push(Call::Ingest(op, data.clone(), format.cloned()));
        Ok(())
    }

    fn request(&mut self, op: OperatorId, resource: &Value, format: Option<&Value>) -> Result<(), EngineError> {
        self.calls
            .push(Call::Request(op, resource.clone(), format.cloned()));
        Ok(())
    }

    fn pulse(&mut self, op: OperatorId, changes: Changeset) -> Result<(), EngineError> {
        self.calls.push(Call::Pulse(op, changes));
        Ok(())
    }

    fn events(&mut self, source: EventSource) -> Result<OperatorId, EngineError> {
        let id = self.allocate();
        self.streams.insert(id, source);
        self.calls.push(Call::Events(id));
        Ok(id)
    }
}

/// Compiles `name()` to a library call and any other text to a field read.
/// Text starting with `!` fails to compile.
struct StubExpressions {
    compiled: Rc<Cell<usize>>,
}

impl ExpressionCompiler for StubExpressions {
    fn compile(&self, text: &str, library: Option<&BoundLibrary>) -> Result<Box<AccessorFn>, ExpressionError> {
        if text.starts_with('!') {
            return Err(ExpressionError::at("unexpected token", 0));
        }
        self.compiled.set(self.compiled.get() + 1);

        if let Some(name) = text.strip_suffix("()") {
            let library = library
                .filter(|lib| lib.contains(name))
                .cloned()
                .ok_or_else(|| ExpressionError::new(format!("unknown function {name}")))?;
            let name = name.to_string();
            return Ok(Box::new(move |_: &Value| library.call(&name, &[]).unwrap_or(Value::Null)));
        }
        let key = text.to_string();
        Ok(Box::new(move |datum: &Value| {
            datum.get(&key).cloned().unwrap_or(Value::Null)
        }))
    }
}

struct IndexLibrary;

impl FunctionLibrary for IndexLibrary {
    fn contains(&self, name: &str) -> bool {
        matches!(name, "itemIndex" | "depth")
    }

    fn call(&self, name: &str, _args: &[Value], context: &ScopeContext) -> Option<Value> {
        match name {
            "itemIndex" => Some(context.item_index().map_or(Value::Null, |i| json!(i))),
            "depth" => Some(json!(context.depth())),
            _ => None,
        }
    }
}

fn parts() -> (RecordingEngine, TransformRegistry, Rc<dyn ExpressionCompiler>) {
    let engine = RecordingEngine::default();
    let expressions = Rc::new(StubExpressions {
        compiled: Rc::clone(&engine.compiled),
    });
    let transforms = [TransformDef::new("Collect"), TransformDef::new("Filter")]
        .into_iter()
        .collect::<TransformRegistry>();
    (engine, transforms, expressions)
}

/// A runtime over a [`RecordingEngine`] with `Collect` and `Filter` registered.
pub(crate) fn runtime() -> Runtime<RecordingEngine> {
    let (engine, transforms, expressions) = parts();
    Runtime::new(engine, transforms, expressions)
}

/// Like [`runtime`], with `itemIndex()` and `depth()` in the library.
pub(crate) fn library_runtime() -> Runtime<RecordingEngine> {
    let (engine, transforms, expressions) = parts();
    Runtime::with_library(engine, transforms, expressions, Rc::new(IndexLibrary))
}
