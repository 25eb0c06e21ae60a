//! Serializable description of an engine graph.

use serde::Serialize;
use serde_json::Value;

use flowspec_core::{describe_parameters, OperatorId, UpdateFn};

use crate::memory::{Dependency, LoadEvent, MemoryEngine, NodeKind, TargetMismatch};

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: OperatorId,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<OperatorId>,
    pub records: usize,
    pub react: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeSummary {
    pub source: OperatorId,
    pub target: OperatorId,
    #[serde(flatten)]
    pub dependency: Dependency,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListenerSummary {
    pub source: OperatorId,
    pub target: OperatorId,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub update: Value,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

/// Snapshot of a [`MemoryEngine`] for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<EdgeSummary>,
    pub listeners: Vec<ListenerSummary>,
    pub loads: Vec<LoadEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<TargetMismatch>,
}

impl GraphSummary {
    pub fn of(engine: &MemoryEngine) -> Self {
        let nodes = engine
            .operators()
            .filter_map(|id| engine.node(id).map(|node| (id, node)))
            .map(|(id, node)| NodeSummary {
                id,
                kind: node.kind.label().to_string(),
                value: match &node.kind {
                    NodeKind::Operator { value, .. } => value.clone(),
                    NodeKind::Stream(source) => Some(stream_value(source)),
                    NodeKind::Transform(_) => None,
                },
                params: params_or_null(&node.params),
                targets: node.targets.clone(),
                records: node.records.len(),
                react: node.react,
            })
            .collect();

        let edges = engine
            .dependencies()
            .map(|(source, target, dependency)| EdgeSummary {
                source,
                target,
                dependency: dependency.clone(),
            })
            .collect();

        let listeners = engine
            .listeners()
            .iter()
            .map(|l| ListenerSummary {
                source: l.source,
                target: l.target,
                update: match &l.update {
                    None => Value::Null,
                    Some(UpdateFn::Value(v)) => serde_json::json!({ "value": v }),
                    Some(UpdateFn::Expression(acc)) => serde_json::json!({
                        "$accessor": acc.name(),
                        "fields": acc.fields(),
                    }),
                },
                params: params_or_null(&l.params),
                options: l.options.clone(),
            })
            .collect();

        GraphSummary {
            nodes,
            edges,
            listeners,
            loads: engine.loads().to_vec(),
            mismatches: engine.verify_targets(),
        }
    }
}

fn params_or_null(params: &flowspec_core::Parameters) -> Value {
    if params.is_empty() {
        Value::Null
    } else {
        describe_parameters(params)
    }
}

fn stream_value(source: &flowspec_core::EventSource) -> Value {
    serde_json::json!({
        "source": source.source,
        "type": source.kind,
        "parent": source.parent,
        "filter": source.filter.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowspec_core::{Behavior, Engine, Parameter, Parameters};
    use serde_json::json;

    #[test]
    fn summary_serializes_nodes_edges_and_loads() {
        let mut engine = MemoryEngine::new();
        let a = engine
            .add(
                Behavior::Operator {
                    value: Some(json!(5)),
                    update: None,
                },
                Parameters::new(),
                true,
            )
            .unwrap();
        let mut params = Parameters::new();
        params.insert("src".into(), Parameter::Operator(a));
        let b = engine
            .add(
                Behavior::Transform(flowspec_core::TransformDef::new("Filter")),
                params,
                true,
            )
            .unwrap();
        engine.connect(a, &[b]).unwrap();
        engine.add_target(a, b).unwrap();
        engine.ingest(a, &json!([1, 2]), None).unwrap();

        let summary = serde_json::to_value(GraphSummary::of(&engine)).unwrap();
        assert_eq!(
            summary["nodes"][0],
            json!({"id": 0, "kind": "Operator", "value": 5, "targets": [1], "records": 2, "react": true})
        );
        assert_eq!(summary["nodes"][1]["params"], json!({"src": {"$operator": 0}}));
        assert_eq!(summary["edges"][0], json!({"source": 0, "target": 1, "kind": "param", "name": "src"}));
        assert_eq!(summary["edges"][1], json!({"source": 0, "target": 1, "kind": "parent"}));
        assert_eq!(summary["loads"][0], json!({"op": 0, "kind": "ingest", "payload": [1, 2]}));
        assert!(summary.get("mismatches").is_none());
    }
}
