//! Value-accessor utilities: field accessors and comparators over JSON data.
//!
//! [`Accessor`] and [`Comparator`] are the callable shapes the resolver
//! memoizes. They are shared through `Rc`, so identity (not just equality) of
//! a memoized function is observable with `Rc::ptr_eq`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompileError;

/// Body of an accessor: datum in, value out.
pub type AccessorFn = dyn Fn(&Value) -> Value;

/// A named function over a datum, annotated with the fields it reads.
pub struct Accessor {
    fields: Vec<String>,
    name: Option<String>,
    func: Box<AccessorFn>,
}

impl Accessor {
    pub fn new(func: Box<AccessorFn>, fields: Vec<String>, name: Option<String>) -> Self {
        Accessor { fields, name, func }
    }

    pub fn call(&self, datum: &Value) -> Value {
        (self.func)(datum)
    }

    /// Field dependencies declared for this accessor.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Sort direction for one comparator key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

impl Order {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "ascending" => Some(Order::Ascending),
            "descending" => Some(Order::Descending),
            _ => None,
        }
    }
}

/// Lexicographic ordering over a list of field keys.
pub struct Comparator {
    keys: Vec<(Accessor, Order)>,
}

impl Comparator {
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (key, order) in &self.keys {
            let ord = compare_values(&key.call(a), &key.call(b));
            let ord = match order {
                Order::Ascending => ord,
                Order::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Field paths this comparator reads, in key order.
    pub fn fields(&self) -> Vec<&str> {
        self.keys
            .iter()
            .flat_map(|(acc, _)| acc.fields().iter().map(String::as_str))
            .collect()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.keys.iter().map(|(_, o)| *o).collect()
    }
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Comparator")
            .field("fields", &self.fields())
            .field("orders", &self.orders())
            .finish()
    }
}

/// Builds a field accessor for `path`; the name defaults to the path itself.
pub fn field(path: &str, name: Option<&str>) -> Result<Accessor, CompileError> {
    let segments = split_access_path(path)?;
    let func = move |datum: &Value| {
        segments
            .iter()
            .try_fold(datum, |value, seg| step(value, seg))
            .cloned()
            .unwrap_or(Value::Null)
    };
    Ok(Accessor::new(
        Box::new(func),
        vec![path.to_string()],
        Some(name.unwrap_or(path).to_string()),
    ))
}

/// Builds a comparator over `fields`. Missing orders default to ascending.
pub fn compare(fields: &[String], orders: &[Order]) -> Result<Comparator, CompileError> {
    let keys = fields
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let order = orders.get(i).copied().unwrap_or_default();
            field(path, None).map(|acc| (acc, order))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Comparator { keys })
}

fn step<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Splits a field path into segments.
///
/// Supports dotted access (`a.b`), brackets (`a[0]`, `a["b c"]`, `a['b']`)
/// and backslash escapes (`a\.b` is the single segment `a.b`).
pub fn split_access_path(path: &str) -> Result<Vec<String>, CompileError> {
    let fail = |reason: &str| CompileError::FieldPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    // Set after a closing bracket so an immediately following '.' does not
    // produce an empty segment.
    let mut just_closed = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(|| fail("dangling escape"))?;
                current.push(escaped);
            }
            '.' => {
                if !(just_closed && current.is_empty()) {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let quote = match chars.peek() {
                    Some(&q) if q == '"' || q == '\'' => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        None => return Err(fail("unterminated bracket")),
                        Some('\\') => {
                            let escaped = chars.next().ok_or_else(|| fail("dangling escape"))?;
                            inner.push(escaped);
                        }
                        Some(q) if Some(q) == quote => {
                            if chars.next() != Some(']') {
                                return Err(fail("expected ']' after quoted segment"));
                            }
                            break;
                        }
                        Some(']') if quote.is_none() => break,
                        Some(other) => inner.push(other),
                    }
                }
                segments.push(inner);
                just_closed = true;
                continue;
            }
            ']' => return Err(fail("unmatched ']'")),
            other => current.push(other),
        }
        just_closed = false;
    }

    if !current.is_empty() || segments.is_empty() || (!just_closed && path.ends_with('.')) {
        segments.push(current);
    }
    Ok(segments)
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}
