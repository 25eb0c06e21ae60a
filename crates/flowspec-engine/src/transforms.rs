//! Built-in transform kinds.

use flowspec_core::{TransformDef, TransformRegistry};
use serde_json::json;

/// Transforms that produce data and are fed by the compiler's data loads.
const SOURCES: &[&str] = &["Collect"];

/// Transforms that take a `$subflow` factory parameter.
const SUBFLOWS: &[&str] = &["Facet", "PreFacet"];

const OTHERS: &[&str] = &[
    "Filter", "Aggregate", "Project", "Sieve", "Extent", "Field", "Compare", "Values", "Bin",
    "Stack", "Pie", "Lookup",
];

/// Registry of the transform kinds the reference engine understands.
pub fn builtin_transforms() -> TransformRegistry {
    let mut registry = TransformRegistry::new();
    for name in SOURCES {
        registry.register(TransformDef::new(*name).with_metadata(json!({"source": true})));
    }
    for name in SUBFLOWS {
        registry.register(TransformDef::new(*name).with_metadata(json!({"subflow": true})));
    }
    for name in OTHERS {
        registry.register(TransformDef::new(*name));
    }
    registry
}
