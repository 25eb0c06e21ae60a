pub mod id;
pub mod error;
pub mod spec;
pub mod accessor;
pub mod expression;
pub mod param;
pub mod reference;
pub mod scope;
pub mod engine;
pub mod transform;
pub mod runtime;
pub mod resolve;
pub mod assemble;
pub mod subflow;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use id::{OperatorId, ScopeId, SpecId};
pub use error::{CompileError, EngineError, ExpressionError};
pub use spec::{DataLoad, DataflowSpec, OperatorRef, OperatorSpec, StreamSpec, UpdateSpec};
pub use accessor::{Accessor, AccessorFn, Comparator, Order};
pub use expression::{BoundLibrary, ExpressionCompiler, FunctionLibrary, ItemPath, ScopeContext};
pub use param::{describe_parameters, Parameter, Parameters};
pub use reference::{ExpressionRef, Reference};
pub use scope::{DataRoles, Function, MemoKey, ScopeTree};
pub use engine::{Behavior, Changeset, Engine, EventSource, UpdateFn};
pub use transform::{TransformDef, TransformRegistry};
pub use runtime::{Runtime, RuntimeConfig};
pub use subflow::Subflow;
