//! Registration of an instantiated operator into its scope.
//!
//! Runs after the engine has created the node. The order matters: the node
//! table entry exists before the data load runs, and the parent link is
//! checked before any signal, scale or data role names the node.

use crate::engine::Engine;
use crate::error::CompileError;
use crate::id::{OperatorId, ScopeId};
use crate::runtime::Runtime;
use crate::spec::{DataLoad, OperatorSpec};

impl<E: Engine> Runtime<E> {
    /// Wires `handle`, the engine node built for `spec`, into `scope`.
    pub fn register_operator(
        &mut self,
        spec: &OperatorSpec,
        handle: OperatorId,
        scope: ScopeId,
    ) -> Result<(), CompileError> {
        self.scopes_mut().set(scope, spec.id.clone(), handle)?;

        if spec.is_collect() {
            if let Some(value) = &spec.value {
                self.load(handle, value)?;
            }
        }

        if spec.root {
            self.scopes_mut().set_root(scope, handle)?;
        }

        if let Some(parent) = &spec.parent {
            let p = self
                .scopes()
                .get(scope, &parent.id)
                .ok_or_else(|| CompileError::UnknownParent {
                    id: spec.id.clone(),
                    parent: parent.id.clone(),
                })?;
            self.engine_mut().connect(p, &[handle])?;
            self.engine_mut().add_target(p, handle)?;
        }

        if let Some(name) = &spec.signal {
            self.scopes_mut().set_signal(scope, name, handle)?;
        }
        if let Some(name) = &spec.scale {
            self.scopes_mut().set_scale(scope, name, handle)?;
        }
        if let Some(data) = &spec.data {
            for (dataset, roles) in data {
                for role in roles {
                    self.scopes_mut().set_data_role(scope, dataset, role, handle)?;
                }
            }
        }

        tracing::debug!(id = %spec.id, op = %handle, scope = %scope, kind = %spec.kind, "registered operator");
        Ok(())
    }

    fn load(&mut self, handle: OperatorId, value: &serde_json::Value) -> Result<(), CompileError> {
        match DataLoad::select(value) {
            DataLoad::Ingest { data, format } => {
                tracing::trace!(op = %handle, "ingest");
                self.engine_mut().ingest(handle, data, format)?;
            }
            DataLoad::Request { resource, format } => {
                tracing::trace!(op = %handle, "request");
                self.engine_mut().request(handle, resource, format)?;
            }
            DataLoad::Inline(records) => {
                let changes = self.engine().changeset().insert(records);
                self.engine_mut().pulse(handle, changes)?;
            }
        }
        Ok(())
    }
}
