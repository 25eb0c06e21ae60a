//! Decoding of reference markers.
//!
//! Parameter values are untyped JSON on the wire. A value that is an object
//! carrying one of the marker keys is decoded here into a [`Reference`];
//! everything downstream matches on the enum instead of probing keys.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::accessor::Order;
use crate::error::CompileError;
use crate::id::SpecId;
use crate::spec::DataflowSpec;

/// One of the five reference kinds, in marker-priority order.
#[derive(Debug, Clone)]
pub enum Reference {
    /// `$ref`: an operator id looked up through the scope chain.
    Operator(SpecId),
    /// `$expr` (+ optional `$params`, `$fields`, `$name`).
    Expression(ExpressionRef),
    /// `$field` (+ optional `$name`).
    Field { path: String, name: Option<String> },
    /// `$compare` (+ optional `$order`).
    Compare { fields: Vec<String>, orders: Vec<Order> },
    /// `$subflow`: an embedded nested specification.
    Subflow(Rc<DataflowSpec>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRef {
    pub text: String,
    pub params: Option<Map<String, Value>>,
    pub fields: Vec<String>,
    pub name: Option<String>,
}

impl Reference {
    /// Decodes `value`, returning `Ok(None)` for anything that is not a
    /// marked object (the literal passthrough case).
    pub fn decode(value: &Value) -> Result<Option<Reference>, CompileError> {
        let Value::Object(obj) = value else {
            return Ok(None);
        };

        if let Some(id) = obj.get("$ref") {
            let id = SpecId::from_json(id)
                .ok_or_else(|| malformed("$ref", "expected a string or integer id"))?;
            return Ok(Some(Reference::Operator(id)));
        }

        if let Some(text) = obj.get("$expr") {
            let text = text
                .as_str()
                .ok_or_else(|| malformed("$expr", "expected expression text"))?;
            return Ok(Some(Reference::Expression(ExpressionRef {
                text: text.to_string(),
                params: expression_params(value).cloned(),
                fields: string_list(obj.get("$fields"), "$fields")?,
                name: optional_string(obj.get("$name"), "$name")?,
            })));
        }

        if let Some(path) = obj.get("$field") {
            let path = path
                .as_str()
                .ok_or_else(|| malformed("$field", "expected a field path"))?;
            return Ok(Some(Reference::Field {
                path: path.to_string(),
                name: optional_string(obj.get("$name"), "$name")?,
            }));
        }

        if let Some(fields) = obj.get("$compare") {
            let fields = string_list(Some(fields), "$compare")?;
            let orders = string_list(obj.get("$order"), "$order")?
                .iter()
                .map(|o| {
                    Order::parse(o).ok_or_else(|| malformed("$order", &format!("unknown order `{o}`")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Some(Reference::Compare { fields, orders }));
        }

        if let Some(nested) = obj.get("$subflow") {
            if !nested.is_object() {
                return Err(malformed("$subflow", "expected a specification object"));
            }
            let spec = DataflowSpec::from_json(nested.clone())?;
            return Ok(Some(Reference::Subflow(Rc::new(spec))));
        }

        Ok(None)
    }

    /// Marker name, for logs and diagnostics.
    pub fn marker(&self) -> &'static str {
        match self {
            Reference::Operator(_) => "$ref",
            Reference::Expression(_) => "$expr",
            Reference::Field { .. } => "$field",
            Reference::Compare { .. } => "$compare",
            Reference::Subflow(_) => "$subflow",
        }
    }
}

/// The nested parameter set of an expression parameter object: present only
/// when the value carries both `$expr` and an object-valued `$params`.
pub fn expression_params(value: &Value) -> Option<&Map<String, Value>> {
    let obj = value.as_object()?;
    obj.get("$expr")?;
    obj.get("$params")?.as_object()
}

fn malformed(marker: &'static str, reason: &str) -> CompileError {
    CompileError::MalformedReference {
        marker,
        reason: reason.to_string(),
    }
}

fn optional_string(value: Option<&Value>, marker: &'static str) -> Result<Option<String>, CompileError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(malformed(marker, "expected a string")),
    }
}

/// Accepts a single string or an array of strings.
fn string_list(value: Option<&Value>, marker: &'static str) -> Result<Vec<String>, CompileError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| malformed(marker, "expected strings"))
            })
            .collect(),
        Some(_) => Err(malformed(marker, "expected a string or array of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Option<Reference> {
        Reference::decode(&value).unwrap()
    }

    #[test]
    fn literals_pass_through() {
        assert!(decode(json!(3)).is_none());
        assert!(decode(json!("text")).is_none());
        assert!(decode(json!([{"$ref": 1}])).is_none());
        assert!(decode(json!({"plain": true})).is_none());
    }

    #[test]
    fn ref_wins_over_other_markers() {
        let r = decode(json!({"$ref": 1, "$expr": "x", "$field": "a"})).unwrap();
        assert!(matches!(r, Reference::Operator(ref id) if id.as_str() == "1"));
    }

    #[test]
    fn expr_wins_over_field() {
        let r = decode(json!({"$expr": "datum.a", "$field": "a"})).unwrap();
        assert_eq!(r.marker(), "$expr");
    }

    #[test]
    fn expression_with_params_and_fields() {
        let r = decode(json!({
            "$expr": "datum.a > 1",
            "$params": {"p": {"$ref": 2}},
            "$fields": ["a"],
            "$name": "filter"
        }))
        .unwrap();
        let Reference::Expression(expr) = r else {
            panic!("expected expression");
        };
        assert_eq!(expr.text, "datum.a > 1");
        assert_eq!(expr.fields, vec!["a"]);
        assert_eq!(expr.name.as_deref(), Some("filter"));
        assert!(expr.params.unwrap().contains_key("p"));
    }

    #[test]
    fn compare_accepts_scalar_or_list() {
        let Reference::Compare { fields, orders } =
            decode(json!({"$compare": "a", "$order": "descending"})).unwrap()
        else {
            panic!("expected comparator");
        };
        assert_eq!(fields, vec!["a"]);
        assert_eq!(orders, vec![Order::Descending]);

        let Reference::Compare { fields, orders } = decode(json!({"$compare": ["a", "b"]})).unwrap()
        else {
            panic!("expected comparator");
        };
        assert_eq!(fields, vec!["a", "b"]);
        assert!(orders.is_empty());
    }

    #[test]
    fn subflow_decodes_nested_spec() {
        let r = decode(json!({"$subflow": {"operators": [{"id": "inner"}]}})).unwrap();
        let Reference::Subflow(spec) = r else {
            panic!("expected subflow");
        };
        assert_eq!(spec.operators.len(), 1);
    }

    #[test]
    fn malformed_markers_are_errors() {
        for bad in [
            json!({"$ref": true}),
            json!({"$expr": 5}),
            json!({"$field": ["a"]}),
            json!({"$compare": 1}),
            json!({"$compare": "a", "$order": "sideways"}),
            json!({"$subflow": 3}),
        ] {
            assert!(
                matches!(
                    Reference::decode(&bad),
                    Err(CompileError::MalformedReference { .. })
                ),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn expression_params_requires_both_markers() {
        assert!(expression_params(&json!({"$expr": "x", "$params": {}})).is_some());
        assert!(expression_params(&json!({"$expr": "x"})).is_none());
        assert!(expression_params(&json!({"$params": {}})).is_none());
    }
}
