//! Deferred nested specifications.
//!
//! A `$subflow` parameter is not compiled when it is resolved. It becomes a
//! [`Subflow`] factory that the engine invokes later, once per partition
//! (facet group, repeated item), each time building a fresh copy of the
//! nested graph in a new child scope.

use std::rc::Rc;

use crate::engine::Engine;
use crate::error::CompileError;
use crate::id::{OperatorId, ScopeId};
use crate::runtime::Runtime;
use crate::spec::DataflowSpec;

#[derive(Debug, Clone)]
pub struct Subflow {
    spec: Rc<DataflowSpec>,
    /// Scope the `$subflow` reference was resolved in.
    scope: ScopeId,
}

impl Subflow {
    pub fn new(spec: Rc<DataflowSpec>, scope: ScopeId) -> Self {
        Subflow { spec, scope }
    }

    pub fn spec(&self) -> &DataflowSpec {
        &self.spec
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Forks the captured scope with `index`, compiles the nested
    /// specification into the fork and returns its first operator's handle.
    ///
    /// Every call creates a new scope and new engine nodes. Names defined by
    /// the nested specification stay in the fork; the captured scope only
    /// gains the fork in its fork list.
    pub fn instantiate<E: Engine>(
        &self,
        runtime: &mut Runtime<E>,
        index: usize,
    ) -> Result<OperatorId, CompileError> {
        let output = self.spec.output().ok_or(CompileError::EmptySubflow)?;

        let limit = runtime.config().max_subflow_depth;
        if runtime.scopes().item_path(self.scope).len() + 1 > limit {
            return Err(CompileError::SubflowDepthExceeded { limit });
        }

        let child = runtime.fork(self.scope, index)?;
        tracing::debug!(parent = %self.scope, child = %child, index, "instantiating subflow");
        runtime.compile_in(&self.spec, child)?;

        runtime
            .scopes()
            .get(child, &output.id)
            .ok_or_else(|| CompileError::UnresolvedReference {
                id: output.id.clone(),
            })
    }
}
