//! In-memory implementation of [`Engine`].
//!
//! [`MemoryEngine`] stores every operator and event stream as a node of a
//! `StableGraph`. Edges record scheduling dependencies: `connect` adds parent
//! edges, operator-valued parameters add parameter edges and derived streams
//! add stream edges. Propagation is not performed; the engine only keeps what
//! the compiler hands it so that the result can be inspected and verified.

use std::fmt;
use std::rc::Rc;

use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use serde::Serialize;
use serde_json::Value;

use flowspec_core::{
    Accessor, Behavior, Changeset, Engine, EngineError, EventSource, OperatorId, Parameter,
    Parameters, TransformDef, UpdateFn,
};

/// What an engine node is.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A plain operator holding a value.
    Operator {
        value: Option<Value>,
        update: Option<Rc<Accessor>>,
    },
    Transform(TransformDef),
    Stream(EventSource),
}

impl NodeKind {
    /// Short label: `Operator`, `Stream`, or the transform name.
    pub fn label(&self) -> &str {
        match self {
            NodeKind::Operator { .. } => "Operator",
            NodeKind::Transform(def) => &def.name,
            NodeKind::Stream(_) => "Stream",
        }
    }
}

/// Node weight of the engine graph.
#[derive(Debug, Clone)]
pub struct OperatorNode {
    pub kind: NodeKind,
    pub params: Parameters,
    pub react: bool,
    /// Downstream propagation targets, in insertion order.
    pub targets: Vec<OperatorId>,
    /// Records currently held (ingested data plus pulse inserts, less removals).
    pub records: Vec<Value>,
}

impl OperatorNode {
    fn new(kind: NodeKind, params: Parameters, react: bool) -> Self {
        OperatorNode {
            kind,
            params,
            react,
            targets: Vec::new(),
            records: Vec::new(),
        }
    }
}

/// Edge weight: why the target depends on the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dependency {
    /// Structural parent link from `connect`.
    Parent,
    /// The target has a parameter referencing the source.
    Param { name: String },
    /// The target stream is derived from the source stream.
    Stream,
}

/// A registered `on` listener.
#[derive(Debug, Clone)]
pub struct Listener {
    pub source: OperatorId,
    pub target: OperatorId,
    pub update: Option<UpdateFn>,
    pub params: Parameters,
    pub options: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadKind {
    Ingest,
    Request,
}

/// One data load handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadEvent {
    pub op: OperatorId,
    pub kind: LoadKind,
    /// Ingested data or requested resource.
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

/// Where a parent edge and a target set disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetMismatch {
    pub source: OperatorId,
    pub target: OperatorId,
    pub missing: Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Missing {
    /// `target` is in the source's target set without a parent edge.
    Edge,
    /// A parent edge exists but `target` is absent from the target set.
    Target,
}

impl fmt::Display for TargetMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.missing {
            Missing::Edge => write!(
                f,
                "operator {} targets operator {} without a parent edge",
                self.source, self.target
            ),
            Missing::Target => write!(
                f,
                "parent edge {} -> {} is missing from the target set of {}",
                self.source, self.target, self.source
            ),
        }
    }
}

/// Graph-backed engine that records everything and runs nothing.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    graph: StableGraph<OperatorNode, Dependency, Directed, u32>,
    listeners: Vec<Listener>,
    loads: Vec<LoadEvent>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn graph(&self) -> &StableGraph<OperatorNode, Dependency, Directed, u32> {
        &self.graph
    }

    pub fn node(&self, op: OperatorId) -> Option<&OperatorNode> {
        self.graph.node_weight(op.into())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Every node handle, in creation order.
    pub fn operators(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.graph.node_indices().map(OperatorId::from)
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn loads(&self) -> &[LoadEvent] {
        &self.loads
    }

    pub fn records(&self, op: OperatorId) -> &[Value] {
        self.node(op).map(|n| n.records.as_slice()).unwrap_or(&[])
    }

    pub fn targets(&self, op: OperatorId) -> &[OperatorId] {
        self.node(op).map(|n| n.targets.as_slice()).unwrap_or(&[])
    }

    /// Sources of parent edges into `op`.
    pub fn parents(&self, op: OperatorId) -> Vec<OperatorId> {
        self.graph
            .edges_directed(op.into(), Direction::Incoming)
            .filter(|e| *e.weight() == Dependency::Parent)
            .map(|e| OperatorId::from(e.source()))
            .collect()
    }

    /// Every dependency edge as `(source, target, dependency)`.
    pub fn dependencies(&self) -> impl Iterator<Item = (OperatorId, OperatorId, &Dependency)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().into(), e.target().into(), e.weight()))
    }

    // -----------------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------------

    /// Every place where parent edges and target sets disagree, in node
    /// order. Empty when the two agree.
    pub fn verify_targets(&self) -> Vec<TargetMismatch> {
        let mut out = Vec::new();
        for idx in self.graph.node_indices() {
            let source = OperatorId::from(idx);
            let children: Vec<OperatorId> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .filter(|e| *e.weight() == Dependency::Parent)
                .map(|e| OperatorId::from(e.target()))
                .collect();
            let targets = self.targets(source);

            for &target in targets {
                if !children.contains(&target) {
                    out.push(TargetMismatch {
                        source,
                        target,
                        missing: Missing::Edge,
                    });
                }
            }
            for &target in &children {
                if !targets.contains(&target) {
                    out.push(TargetMismatch {
                        source,
                        target,
                        missing: Missing::Target,
                    });
                }
            }
        }
        out
    }

    /// Fails with the first mismatch reported by [`verify_targets`](Self::verify_targets).
    pub fn ensure_consistent(&self) -> Result<(), EngineError> {
        match self.verify_targets().first() {
            None => Ok(()),
            Some(mismatch) => Err(EngineError::Inconsistent {
                reason: mismatch.to_string(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn node_mut(&mut self, op: OperatorId) -> Result<&mut OperatorNode, EngineError> {
        self.graph
            .node_weight_mut(op.into())
            .ok_or(EngineError::UnknownOperator { id: op })
    }

    fn require(&self, op: OperatorId) -> Result<(), EngineError> {
        if self.graph.contains_node(op.into()) {
            Ok(())
        } else {
            Err(EngineError::UnknownOperator { id: op })
        }
    }

    /// Operator handles referenced by `params`, including inside arrays.
    fn param_sources(params: &Parameters) -> Vec<(String, OperatorId)> {
        fn walk(name: &str, p: &Parameter, out: &mut Vec<(String, OperatorId)>) {
            match p {
                Parameter::Operator(op) => out.push((name.to_string(), *op)),
                Parameter::Array(items) => items.iter().for_each(|item| walk(name, item, out)),
                _ => {}
            }
        }
        let mut out = Vec::new();
        for (name, p) in params {
            walk(name, p, &mut out);
        }
        out
    }
}

impl Engine for MemoryEngine {
    fn add(&mut self, behavior: Behavior, params: Parameters, react: bool) -> Result<OperatorId, EngineError> {
        let sources = Self::param_sources(&params);
        for (_, source) in &sources {
            self.require(*source)?;
        }

        let kind = match behavior {
            Behavior::Operator { value, update } => NodeKind::Operator { value, update },
            Behavior::Transform(def) => NodeKind::Transform(def),
        };
        let label = kind.label().to_string();
        let idx = self.graph.add_node(OperatorNode::new(kind, params, react));
        // Only reactive nodes are scheduled when their parameters change.
        if react {
            for (name, source) in sources {
                self.graph
                    .add_edge(source.into(), idx, Dependency::Param { name });
            }
        }

        let op = OperatorId::from(idx);
        tracing::trace!(op = %op, kind = %label, "added node");
        Ok(op)
    }

    fn connect(&mut self, parent: OperatorId, children: &[OperatorId]) -> Result<(), EngineError> {
        self.require(parent)?;
        for &child in children {
            self.require(child)?;
            self.graph
                .add_edge(parent.into(), child.into(), Dependency::Parent);
        }
        Ok(())
    }

    fn add_target(&mut self, source: OperatorId, target: OperatorId) -> Result<(), EngineError> {
        self.require(target)?;
        let node = self.node_mut(source)?;
        if !node.targets.contains(&target) {
            node.targets.push(target);
        }
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
        self.require(source)?;
        self.require(target)?;
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
        let node = self.node_mut(op)?;
        match data {
            Value::Array(items) => node.records.extend(items.iter().cloned()),
            Value::Object(_) => node.records.push(data.clone()),
            // Raw text and other payloads are kept only in the load log;
            // parsing them by format belongs to a real loader.
            _ => {}
        }
        self.loads.push(LoadEvent {
            op,
            kind: LoadKind::Ingest,
            payload: data.clone(),
            format: format.cloned(),
        });
        Ok(())
    }

    fn request(&mut self, op: OperatorId, resource: &Value, format: Option<&Value>) -> Result<(), EngineError> {
        self.require(op)?;
        if !(resource.is_string() || resource.is_object()) {
            return Err(EngineError::Load {
                id: op,
                reason: format!("request resource must be a URL or an object, got {resource}"),
            });
        }
        self.loads.push(LoadEvent {
            op,
            kind: LoadKind::Request,
            payload: resource.clone(),
            format: format.cloned(),
        });
        tracing::debug!(op = %op, "queued request");
        Ok(())
    }

    fn pulse(&mut self, op: OperatorId, changes: Changeset) -> Result<(), EngineError> {
        let node = self.node_mut(op)?;
        for record in changes.removed() {
            if let Some(pos) = node.records.iter().position(|r| r == record) {
                node.records.remove(pos);
            }
        }
        node.records.extend(changes.inserted().iter().cloned());
        Ok(())
    }

    fn events(&mut self, mut source: EventSource) -> Result<OperatorId, EngineError> {
        if let Some(parent) = source.parent {
            self.require(parent)?;
        }
        for (_, op) in Self::param_sources(&source.params) {
            self.require(op)?;
        }
        let parent = source.parent;
        let params = std::mem::take(&mut source.params);
        let idx = self
            .graph
            .add_node(OperatorNode::new(NodeKind::Stream(source), params, true));
        if let Some(parent) = parent {
            self.graph.add_edge(parent.into(), idx, Dependency::Stream);
        }
        Ok(OperatorId::from(idx))
    }
}
