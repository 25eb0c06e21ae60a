//! Registry of named node behaviors (transforms).

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// A registered transform kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformDef {
    pub name: String,
    /// Free-form metadata the engine may interpret (parameter schema,
    /// capability flags).
    #[serde(skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl TransformDef {
    pub fn new(name: impl Into<String>) -> Self {
        TransformDef {
            name: name.into(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Transform lookup by behavior tag.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: IndexMap<String, TransformDef>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `def`, replacing any previous definition with the same name.
    pub fn register(&mut self, def: TransformDef) {
        self.transforms.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&TransformDef> {
        self.transforms.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transforms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl FromIterator<TransformDef> for TransformRegistry {
    fn from_iter<I: IntoIterator<Item = TransformDef>>(iter: I) -> Self {
        let mut registry = TransformRegistry::new();
        for def in iter {
            registry.register(def);
        }
        registry
    }
}
