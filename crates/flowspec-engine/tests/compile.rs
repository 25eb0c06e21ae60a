use std::rc::Rc;

use flowspec_core::{CompileError, DataflowSpec, OperatorId, Parameter, Runtime, RuntimeConfig, UpdateFn};
use flowspec_engine::{builtin_transforms, GraphSummary, MemoryEngine, NodeKind};
use flowspec_expr::{ExprCompiler, StandardLibrary};
use serde_json::{json, Value};

fn runtime() -> Runtime<MemoryEngine> {
    Runtime::with_library(
        MemoryEngine::new(),
        builtin_transforms(),
        Rc::new(ExprCompiler),
        Rc::new(StandardLibrary),
    )
}

fn spec(value: Value) -> DataflowSpec {
    DataflowSpec::from_json(value).unwrap()
}

fn op(rt: &Runtime<MemoryEngine>, scope: flowspec_core::ScopeId, id: &str) -> OperatorId {
    rt.scopes().get(scope, &id.into()).unwrap()
}

#[test]
fn two_node_example() {
    let mut rt = runtime();
    let scope = rt
        .compile(&spec(json!({"operators": [
            {"id": 1, "type": "Collect", "value": {"$ingest": true}, "root": true},
            {"id": 2, "parent": {"$ref": 1}, "value": {"op": {"$ref": 1}}}
        ]})))
        .unwrap();

    let one = op(&rt, scope, "1");
    let two = op(&rt, scope, "2");
    let engine = rt.engine();

    assert_eq!(rt.scopes().root(scope), Some(one));
    assert_eq!(engine.parents(two), vec![one]);
    assert_eq!(engine.targets(one), &[two]);
    assert_eq!(engine.node(two).unwrap().params["op"].as_operator(), Some(one));
    assert!(engine.verify_targets().is_empty());
}

#[test]
fn filter_pipeline_with_expressions() {
    let mut rt = runtime();
    let scope = rt
        .compile(&spec(json!({"operators": [
            {"id": "threshold", "value": 20, "signal": "threshold"},
            {"id": "table", "type": "Collect", "value": [
                {"category": "A", "amount": 28},
                {"category": "B", "amount": 55}
            ], "data": {"table": ["input"]}},
            {"id": "filter", "type": "Filter", "params": {
                "expr": {"$expr": "datum.amount > 30", "$fields": ["amount"]},
                "pulse": {"$ref": "table"}
            }, "parent": {"$ref": "table"}, "data": {"table": ["output"]}},
            {"id": "sort", "type": "Collect", "params": {
                "sort": {"$compare": ["category", "amount"], "$order": ["ascending", "descending"]}
            }}
        ]})))
        .unwrap();

    let table = op(&rt, scope, "table");
    let filter = op(&rt, scope, "filter");
    let engine = rt.engine();

    assert_eq!(engine.records(table).len(), 2);
    let predicate = engine.node(filter).unwrap().params["expr"]
        .as_accessor()
        .cloned()
        .unwrap();
    assert_eq!(predicate.fields(), &["amount".to_string()]);
    assert_eq!(predicate.call(&json!({"amount": 55})), json!(true));
    assert_eq!(predicate.call(&json!({"amount": 28})), json!(false));

    let roles = rt.scopes().dataset(scope, "table").unwrap();
    assert_eq!(roles.get("input"), Some(&table));
    assert_eq!(roles.get("output"), Some(&filter));

    let sort = op(&rt, scope, "sort");
    let cmp = engine.node(sort).unwrap().params["sort"]
        .as_comparator()
        .cloned()
        .unwrap();
    assert_eq!(
        cmp.compare(&json!({"category": "A", "amount": 1}), &json!({"category": "A", "amount": 2})),
        std::cmp::Ordering::Greater
    );
}

#[test]
fn facet_subflows_are_isolated_per_item() {
    let mut rt = runtime();
    let scope = rt
        .compile(&spec(json!({"operators": [
            {"id": "width", "value": 400, "signal": "width"},
            {"id": "x", "value": null, "scale": "x"},
            {"id": "facet", "type": "Facet", "params": {
                "subflow": {"$subflow": {"operators": [
                    {"id": "cell", "type": "Collect", "root": true},
                    {"id": "size", "update": {"$expr": "itemIndex() * 10", "$params": {"w": {"$ref": "width"}}},
                     "signal": "cellSize"},
                    {"id": "mark", "type": "Filter", "parent": {"$ref": "cell"},
                     "params": {"scale": {"$ref": "x"}}}
                ]}}
            }}
        ]})))
        .unwrap();

    let facet = op(&rt, scope, "facet");
    let width = op(&rt, scope, "width");
    let x = op(&rt, scope, "x");
    let factory = rt.engine().node(facet).unwrap().params["subflow"]
        .as_subflow()
        .cloned()
        .unwrap();

    let first = factory.instantiate(&mut rt, 0).unwrap();
    let second = factory.instantiate(&mut rt, 1).unwrap();
    assert_ne!(first, second);

    let forks = rt.scopes().forks(scope).to_vec();
    assert_eq!(forks.len(), 2);
    for (index, fork) in forks.iter().enumerate() {
        assert_eq!(rt.scopes().item_path(*fork), &[index]);
        assert_eq!(rt.scopes().signal(*fork, "width"), Some(width));
        assert_eq!(rt.scopes().scale(*fork, "x"), Some(x));

        let size = rt.scopes().signal(*fork, "cellSize").unwrap();
        let node = rt.engine().node(size).unwrap();
        assert_eq!(node.params["w"].as_operator(), Some(width));
        let NodeKind::Operator { update: Some(update), .. } = &node.kind else {
            panic!("expected an update expression");
        };
        assert_eq!(update.call(&Value::Null), json!(index * 10));

        let mark = rt.scopes().get(*fork, &"mark".into()).unwrap();
        assert_eq!(rt.engine().node(mark).unwrap().params["scale"].as_operator(), Some(x));
    }

    // Sibling forks do not share node tables, and nothing leaks upward.
    assert_ne!(
        rt.scopes().get(forks[0], &"mark".into()),
        rt.scopes().get(forks[1], &"mark".into())
    );
    assert_eq!(rt.scopes().signal(scope, "cellSize"), None);
    assert!(rt.engine().verify_targets().is_empty());
}

#[test]
fn memoized_expressions_are_shared_into_subflows() {
    let mut rt = runtime();
    let scope = rt
        .compile(&spec(json!({"operators": [
            {"id": "a", "params": {"f": {"$expr": "datum.v * 2"}}},
            {"id": "facet", "type": "Facet", "params": {"subflow": {"$subflow": {"operators": [
                {"id": "b", "params": {"f": {"$expr": "datum.v * 2"}}}
            ]}}}}
        ]})))
        .unwrap();

    let a = op(&rt, scope, "a");
    let facet = op(&rt, scope, "facet");
    let factory = rt.engine().node(facet).unwrap().params["subflow"]
        .as_subflow()
        .cloned()
        .unwrap();
    let b = factory.instantiate(&mut rt, 0).unwrap();

    let fa = rt.engine().node(a).unwrap().params["f"].as_accessor().cloned().unwrap();
    let fb = rt.engine().node(b).unwrap().params["f"].as_accessor().cloned().unwrap();
    assert!(Rc::ptr_eq(&fa, &fb));
}

#[test]
fn nested_subflow_depth_is_bounded() {
    let mut rt = runtime().with_config(RuntimeConfig {
        max_subflow_depth: 1,
    });
    let scope = rt
        .compile(&spec(json!({"operators": [
            {"id": "outer", "type": "Facet", "params": {"subflow": {"$subflow": {"operators": [
                {"id": "inner", "type": "Facet", "params": {"subflow": {"$subflow": {"operators": [
                    {"id": "leaf"}
                ]}}}}
            ]}}}}
        ]})))
        .unwrap();

    let outer = op(&rt, scope, "outer");
    let factory = rt.engine().node(outer).unwrap().params["subflow"]
        .as_subflow()
        .cloned()
        .unwrap();
    let inner = factory.instantiate(&mut rt, 0).unwrap();
    let nested = rt.engine().node(inner).unwrap().params["subflow"]
        .as_subflow()
        .cloned()
        .unwrap();
    let err = nested.instantiate(&mut rt, 0).unwrap_err();
    assert!(matches!(err, CompileError::SubflowDepthExceeded { limit: 1 }));
}

#[test]
fn streams_and_updates() {
    let mut rt = runtime();
    let scope = rt
        .compile(&spec(json!({
            "operators": [{"id": "count", "value": 0, "signal": "count"}],
            "streams": [
                {"id": "clicks", "source": "view", "type": "click"},
                {"id": "shift", "stream": {"$ref": "clicks"}, "filter": {"$expr": "datum.shiftKey"}}
            ],
            "updates": [{
                "source": {"$ref": "shift"},
                "target": {"$ref": "count"},
                "update": {"$expr": "count + 1", "$params": {"count": {"$ref": "count"}}}
            }]
        })))
        .unwrap();

    let count = op(&rt, scope, "count");
    let shift = op(&rt, scope, "shift");
    let engine = rt.engine();
    let listener = &engine.listeners()[0];
    assert_eq!((listener.source, listener.target), (shift, count));
    assert_eq!(listener.params["count"].as_operator(), Some(count));
    let Some(UpdateFn::Expression(update)) = &listener.update else {
        panic!("expected an expression update");
    };
    assert_eq!(update.call(&json!({"count": 4})), json!(5));
}

#[test]
fn unknown_library_function_fails_compile() {
    let mut rt = runtime();
    let err = rt
        .compile(&spec(json!({"operators": [
            {"id": "bad", "params": {"f": {"$expr": "launch()"}}}
        ]})))
        .unwrap_err();
    assert!(err.to_string().starts_with("in bad: invalid expression `launch()`"));
}

#[test]
fn request_and_inline_loads() {
    let mut rt = runtime();
    let scope = rt
        .compile(&spec(json!({"operators": [
            {"id": "remote", "type": "Collect", "value": {"$request": "data/cars.json", "$format": {"type": "json"}}},
            {"id": "inline", "type": "Collect", "value": {"a": 1}}
        ]})))
        .unwrap();
    let remote = op(&rt, scope, "remote");
    let inline = op(&rt, scope, "inline");
    let engine = rt.engine();
    assert!(engine.records(remote).is_empty());
    assert_eq!(engine.loads().len(), 1);
    assert_eq!(engine.records(inline), &[json!({"a": 1})]);
}

#[test]
fn summary_describes_subflow_parameters() {
    let mut rt = runtime();
    rt.compile(&spec(json!({"operators": [
        {"id": "facet", "type": "Facet", "params": {
            "subflow": {"$subflow": {"operators": [{"id": "cell"}]}},
            "groupby": [{"$field": "category"}]
        }}
    ]})))
    .unwrap();
    let summary = serde_json::to_value(GraphSummary::of(rt.engine())).unwrap();
    assert_eq!(
        summary["nodes"][0]["params"],
        json!({
            "subflow": {"$subflow": "cell"},
            "groupby": [{"$accessor": "category", "fields": ["category"]}]
        })
    );
    assert!(matches!(
        rt.engine().node(OperatorId(0)).unwrap().params["groupby"],
        Parameter::Array(_)
    ));
}
