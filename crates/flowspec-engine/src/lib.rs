pub mod memory;
pub mod summary;
pub mod transforms;

// Re-export commonly used types
pub use memory::{
    Dependency, Listener, LoadEvent, LoadKind, MemoryEngine, Missing, NodeKind, OperatorNode,
    TargetMismatch,
};
pub use summary::GraphSummary;
pub use transforms::builtin_transforms;
