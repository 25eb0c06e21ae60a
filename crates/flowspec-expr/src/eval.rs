//! Tree-walking evaluator.
//!
//! Evaluation never fails: operands of the wrong type produce `null`, and the
//! engine decides how `null` propagates.

use std::cmp::Ordering;

use flowspec_core::accessor::compare_values;
use flowspec_core::BoundLibrary;
use serde_json::{Number, Value};

use crate::parser::{BinaryOp, Expr, UnaryOp};

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Converts an f64 into a JSON number, preferring integers so that `2 * 3`
/// compares equal to the literal `6`. Non-finite results become `null`.
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// JavaScript-style truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(crate) struct Evaluator<'a> {
    pub datum: &'a Value,
    pub library: Option<&'a BoundLibrary>,
}

impl Evaluator<'_> {
    pub fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(v) => v.clone(),
            Expr::Array(items) => Value::Array(items.iter().map(|e| self.eval(e)).collect()),
            Expr::Ident(name) if name == "datum" => self.datum.clone(),
            Expr::Ident(name) => self.datum.get(name).cloned().unwrap_or(Value::Null),
            Expr::Member { object, property } => member(&self.eval(object), &self.eval(property)),
            Expr::Unary { op, operand } => {
                let v = self.eval(operand);
                match op {
                    UnaryOp::Not => Value::Bool(!truthy(&v)),
                    UnaryOp::Neg => v.as_f64().map_or(Value::Null, |n| number(-n)),
                }
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let l = self.eval(left);
                if truthy(&l) {
                    self.eval(right)
                } else {
                    l
                }
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let l = self.eval(left);
                if truthy(&l) {
                    l
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary { op, left, right } => binary(*op, &self.eval(left), &self.eval(right)),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if truthy(&self.eval(test)) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { name, args, .. } => {
                let args: Vec<Value> = args.iter().map(|e| self.eval(e)).collect();
                self.library
                    .and_then(|lib| lib.call(name, &args))
                    .unwrap_or(Value::Null)
            }
        }
    }
}

fn member(object: &Value, property: &Value) -> Value {
    match (object, property) {
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::Array(items), Value::String(key)) if key == "length" => Value::from(items.len()),
        (Value::String(s), Value::String(key)) if key == "length" => Value::from(s.chars().count()),
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(loose_eq(l, r)),
        BinaryOp::Ne => Value::Bool(!loose_eq(l, r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = match (l, r) {
                (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
                    compare_values(l, r)
                }
                _ => return Value::Null,
            };
            Value::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
        BinaryOp::Add => match (l, r) {
            (Value::String(a), b) => Value::String(format!("{a}{}", display(b))),
            (a, Value::String(b)) => Value::String(format!("{}{b}", display(a))),
            _ => arithmetic(l, r, |a, b| a + b),
        },
        BinaryOp::Sub => arithmetic(l, r, |a, b| a - b),
        BinaryOp::Mul => arithmetic(l, r, |a, b| a * b),
        BinaryOp::Div => arithmetic(l, r, |a, b| a / b),
        BinaryOp::Mod => arithmetic(l, r, |a, b| a % b),
        BinaryOp::And | BinaryOp::Or => Value::Null,
    }
}

fn arithmetic(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => number(f(a, b)),
        _ => Value::Null,
    }
}

/// Equality with numbers compared by value (`1 == 1.0`).
fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => l == r,
    }
}

/// String form used by concatenation and `toString`.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn eval(text: &str, datum: Value) -> Value {
        let expr = parse(text).unwrap();
        Evaluator {
            datum: &datum,
            library: None,
        }
        .eval(&expr)
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3", Value::Null), json!(7));
        assert_eq!(eval("(1 + 2) * 3", Value::Null), json!(9));
        assert_eq!(eval("7 % 4", Value::Null), json!(3));
        assert_eq!(eval("1 / 4", Value::Null), json!(0.25));
        assert_eq!(eval("-datum.x", json!({"x": 2})), json!(-2));
    }

    #[test]
    fn division_by_zero_is_null() {
        assert_eq!(eval("1 / 0", Value::Null), Value::Null);
    }

    #[test]
    fn field_access() {
        let d = json!({"a": {"b": [10, 20]}, "name": "abc"});
        assert_eq!(eval("datum.a.b[1]", d.clone()), json!(20));
        assert_eq!(eval("datum['name'].length", d.clone()), json!(3));
        assert_eq!(eval("a.b.length", d.clone()), json!(2));
        assert_eq!(eval("datum.missing.deeper", d), Value::Null);
    }

    #[test]
    fn comparison_and_logic() {
        let d = json!({"x": 5, "s": "b"});
        assert_eq!(eval("datum.x > 3 && datum.x <= 5", d.clone()), json!(true));
        assert_eq!(eval("datum.s < 'a' || datum.s == 'b'", d.clone()), json!(true));
        assert_eq!(eval("datum.x > 'a'", d.clone()), Value::Null);
        assert_eq!(eval("datum.nope || 'fallback'", d.clone()), json!("fallback"));
        assert_eq!(eval("!datum.x", d), json!(false));
        assert_eq!(eval("1 == 1.0", Value::Null), json!(true));
    }

    #[test]
    fn conditional() {
        assert_eq!(eval("datum.x ? 'yes' : 'no'", json!({"x": 0})), json!("no"));
        assert_eq!(eval("datum.x ? 'yes' : 'no'", json!({"x": 1})), json!("yes"));
    }

    #[test]
    fn concatenation() {
        assert_eq!(eval("'n=' + datum.n", json!({"n": 3})), json!("n=3"));
        assert_eq!(eval("[1, 'a', null]", Value::Null), json!([1, "a", null]));
    }

    #[test]
    fn type_errors_are_null() {
        assert_eq!(eval("datum - 1", json!({"x": 1})), Value::Null);
        assert_eq!(eval("-'a'", Value::Null), Value::Null);
    }

    #[test]
    fn calls_without_library_are_null() {
        assert_eq!(eval("abs(-1)", Value::Null), Value::Null);
    }
}
