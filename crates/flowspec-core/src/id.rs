//! Identifier newtypes.
//!
//! Three id spaces meet in the compiler and must never be confused:
//! [`SpecId`] names an entry of the declarative specification, [`OperatorId`]
//! is the engine's handle for a live node, and [`ScopeId`] addresses a frame
//! in the [`ScopeTree`](crate::scope::ScopeTree).

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Engine handle for an instantiated operator (or event stream).
/// Maps to a petgraph `NodeIndex<u32>` in graph-backed engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub u32);

/// Index of a scope frame inside a [`ScopeTree`](crate::scope::ScopeTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

/// Specification-level identifier.
///
/// The wire format allows both strings and integers; both normalize to the
/// same textual key so `1` and `"1"` refer to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawSpecId", into = "String")]
pub struct SpecId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSpecId {
    Int(i64),
    Text(String),
}

impl From<RawSpecId> for SpecId {
    fn from(raw: RawSpecId) -> Self {
        match raw {
            RawSpecId::Int(n) => SpecId(n.to_string()),
            RawSpecId::Text(s) => SpecId(s),
        }
    }
}

impl From<SpecId> for String {
    fn from(id: SpecId) -> Self {
        id.0
    }
}

impl SpecId {
    pub fn new(id: impl Into<String>) -> Self {
        SpecId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes an id from an untyped JSON value (string or integer).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(SpecId(s.clone())),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(|i| SpecId(i.to_string()))
                .or_else(|| n.as_u64().map(|u| SpecId(u.to_string()))),
            _ => None,
        }
    }
}

impl From<&str> for SpecId {
    fn from(s: &str) -> Self {
        SpecId(s.to_string())
    }
}

impl From<u32> for SpecId {
    fn from(n: u32) -> Self {
        SpecId(n.to_string())
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Bridge between OperatorId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for OperatorId {
    fn from(idx: NodeIndex<u32>) -> Self {
        OperatorId(idx.index() as u32)
    }
}

impl From<OperatorId> for NodeIndex<u32> {
    fn from(id: OperatorId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let op = OperatorId::from(idx);
        assert_eq!(op.0, 42);

        let back: NodeIndex<u32> = op.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn spec_id_accepts_integers_and_strings() {
        let a: SpecId = serde_json::from_str("1").unwrap();
        let b: SpecId = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "1");
    }

    #[test]
    fn spec_id_from_json_rejects_other_shapes() {
        assert_eq!(
            SpecId::from_json(&serde_json::json!(7)),
            Some(SpecId::from("7"))
        );
        assert_eq!(SpecId::from_json(&serde_json::json!(true)), None);
        assert_eq!(SpecId::from_json(&serde_json::json!({"a": 1})), None);
    }

    #[test]
    fn spec_id_serializes_as_string() {
        let json = serde_json::to_string(&SpecId::from(3u32)).unwrap();
        assert_eq!(json, "\"3\"");
    }

    #[test]
    fn display_prints_inner_value() {
        assert_eq!(format!("{}", OperatorId(7)), "7");
        assert_eq!(format!("{}", ScopeId(0)), "0");
        assert_eq!(format!("{}", SpecId::from("facet")), "facet");
    }
}
