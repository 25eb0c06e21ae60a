//! The compile driver.
//!
//! [`Runtime`] owns the engine, the scope tree and the collaborators, and
//! walks a [`DataflowSpec`] in one synchronous pass: operators in declaration
//! order, then event streams, then update listeners. Each operator's
//! parameters are resolved, the engine creates the node, and the assembler
//! wires it into the scope. Nested specifications re-enter the same pass
//! through [`Subflow::instantiate`](crate::subflow::Subflow::instantiate).

use std::rc::Rc;

use serde_json::Value;

use crate::engine::{Behavior, Engine, EventSource, UpdateFn};
use crate::error::CompileError;
use crate::expression::{ExpressionCompiler, FunctionLibrary};
use crate::id::{OperatorId, ScopeId, SpecId};
use crate::param::{Parameter, Parameters};
use crate::reference::expression_params;
use crate::scope::ScopeTree;
use crate::spec::{DataflowSpec, OperatorSpec, StreamSpec, UpdateSpec, OPERATOR};
use crate::transform::TransformRegistry;

/// Configuration for the compile driver.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum item-path length of an instantiated subflow scope. Default: 64.
    pub max_subflow_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_subflow_depth: 64,
        }
    }
}

/// Compiles specifications into a live engine graph.
pub struct Runtime<E: Engine> {
    engine: E,
    scopes: ScopeTree,
    transforms: TransformRegistry,
    pub(crate) expressions: Rc<dyn ExpressionCompiler>,
    config: RuntimeConfig,
}

impl<E: Engine> Runtime<E> {
    /// Creates a runtime with an empty root scope and no function library.
    pub fn new(
        engine: E,
        transforms: TransformRegistry,
        expressions: Rc<dyn ExpressionCompiler>,
    ) -> Self {
        Self::build(engine, transforms, expressions, None)
    }

    /// Creates a runtime whose root scope binds `library`.
    pub fn with_library(
        engine: E,
        transforms: TransformRegistry,
        expressions: Rc<dyn ExpressionCompiler>,
        library: Rc<dyn FunctionLibrary>,
    ) -> Self {
        Self::build(engine, transforms, expressions, Some(library))
    }

    fn build(
        engine: E,
        transforms: TransformRegistry,
        expressions: Rc<dyn ExpressionCompiler>,
        library: Option<Rc<dyn FunctionLibrary>>,
    ) -> Self {
        Runtime {
            engine,
            scopes: ScopeTree::new(library),
            transforms,
            expressions,
            config: RuntimeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut ScopeTree {
        &mut self.scopes
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn root_scope(&self) -> ScopeId {
        self.scopes.root_id()
    }

    /// Forks `parent`, appending `index` to the child's item path.
    pub fn fork(&mut self, parent: ScopeId, index: usize) -> Result<ScopeId, CompileError> {
        self.scopes.fork(parent, index)
    }

    /// Passthrough to the engine's event system.
    pub fn events(&mut self, source: EventSource) -> Result<OperatorId, CompileError> {
        Ok(self.engine.events(source)?)
    }

    // -----------------------------------------------------------------------
    // Driver
    // -----------------------------------------------------------------------

    /// Compiles `spec` into the root scope and returns it.
    pub fn compile(&mut self, spec: &DataflowSpec) -> Result<ScopeId, CompileError> {
        let root = self.scopes.root_id();
        self.compile_in(spec, root)?;
        Ok(root)
    }

    /// Compiles `spec` into an existing scope.
    pub fn compile_in(&mut self, spec: &DataflowSpec, scope: ScopeId) -> Result<(), CompileError> {
        let span = tracing::debug_span!(
            "compile",
            scope = %scope,
            operators = spec.operators.len(),
            streams = spec.streams.len(),
            updates = spec.updates.len(),
        );
        let _enter = span.enter();

        for op in &spec.operators {
            self.compile_operator(op, scope)
                .map_err(|e| e.in_operator(&op.id))?;
        }
        for stream in &spec.streams {
            self.compile_stream(stream, scope)
                .map_err(|e| e.in_operator(&stream.id))?;
        }
        for update in &spec.updates {
            self.compile_update(update, scope)
                .map_err(|e| e.in_operator(&update.target.id))?;
        }
        Ok(())
    }

    /// Resolves, instantiates and assembles one operator.
    pub fn compile_operator(
        &mut self,
        spec: &OperatorSpec,
        scope: ScopeId,
    ) -> Result<OperatorId, CompileError> {
        let mut params = Parameters::new();
        let mut initial = None;

        if !spec.is_collect() {
            match &spec.value {
                Some(Value::Object(map)) => {
                    self.resolve_parameters_into(map, scope, &mut params)?;
                    // A plain record is also the operator's starting value.
                    let plain = map
                        .keys()
                        .all(|key| matches!(params.get(key), Some(Parameter::Literal(_))));
                    if plain {
                        initial = Some(Value::Object(map.clone()));
                    }
                }
                Some(other) => initial = Some(other.clone()),
                None => {}
            }
        }
        if let Some(map) = &spec.params {
            self.resolve_parameters_into(map, scope, &mut params)?;
        }

        let transform = match self.transforms.get(&spec.kind) {
            Some(def) if spec.kind != OPERATOR => Some(def.clone()),
            _ => None,
        };
        let behavior = match transform {
            Some(def) => Behavior::Transform(def),
            None => {
                let update = match &spec.update {
                    Some(value) => Some(self.resolve_function(value, scope, &mut params, "update")?),
                    None => None,
                };
                Behavior::Operator {
                    value: initial,
                    update,
                }
            }
        };

        let handle = self.engine.add(behavior, params, spec.react)?;
        self.register_operator(spec, handle, scope)?;
        Ok(handle)
    }

    fn compile_stream(&mut self, spec: &StreamSpec, scope: ScopeId) -> Result<(), CompileError> {
        let parent = match &spec.stream {
            Some(r) => Some(self.lookup(scope, &r.id)?),
            None => None,
        };
        let mut params = Parameters::new();
        let filter = match &spec.filter {
            Some(value) => Some(self.resolve_function(value, scope, &mut params, "filter")?),
            None => None,
        };

        let stream = self.engine.events(EventSource {
            source: spec.source.clone(),
            kind: spec.kind.clone(),
            parent,
            filter,
            params,
        })?;
        self.scopes.set(scope, spec.id.clone(), stream)?;
        tracing::debug!(id = %spec.id, stream = %stream, "registered stream");
        Ok(())
    }

    fn compile_update(&mut self, spec: &UpdateSpec, scope: ScopeId) -> Result<(), CompileError> {
        let source_id = spec
            .source_id()
            .ok_or_else(|| CompileError::MalformedReference {
                marker: "source",
                reason: format!("expected an id or {{\"$ref\": id}}, got {}", spec.source),
            })?;
        let source = self.lookup(scope, &source_id)?;
        let target = self.lookup(scope, &spec.target.id)?;

        let mut params = Parameters::new();
        let update = match &spec.update {
            None => None,
            Some(value) => {
                if let Some(nested) = expression_params(value) {
                    self.resolve_parameters_into(nested, scope, &mut params)?;
                }
                match self.resolve_one(value, scope)? {
                    Parameter::Literal(v) => Some(UpdateFn::Value(v)),
                    Parameter::Accessor(acc) => Some(UpdateFn::Expression(acc)),
                    _ => {
                        return Err(CompileError::MalformedReference {
                            marker: "update",
                            reason: "expected a literal value or an expression".to_string(),
                        })
                    }
                }
            }
        };
        if let Some(map) = &spec.params {
            self.resolve_parameters_into(map, scope, &mut params)?;
        }

        self.engine
            .on(source, target, update, params, spec.options.clone())?;
        tracing::debug!(source = %source, target = %target, "registered update listener");
        Ok(())
    }

    /// Node-table lookup that fails with an unresolved-reference error.
    pub(crate) fn lookup(&self, scope: ScopeId, id: &SpecId) -> Result<OperatorId, CompileError> {
        self.scopes
            .get(scope, id)
            .ok_or_else(|| CompileError::UnresolvedReference { id: id.clone() })
    }
}
