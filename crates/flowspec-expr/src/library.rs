//! The standard function library.

use flowspec_core::{FunctionLibrary, ScopeContext};
use serde_json::Value;

use crate::eval::{display, number};

/// Names callable from expressions when [`StandardLibrary`] is bound.
pub const FUNCTIONS: &[&str] = &[
    "abs", "ceil", "floor", "round", "sqrt", "pow", "min", "max", "length", "upper", "lower",
    "isValid", "toString", "toNumber", "itemPath", "itemIndex", "depth",
];

/// Math, string and type helpers plus the scope-aware `itemPath()`,
/// `itemIndex()` and `depth()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardLibrary;

impl FunctionLibrary for StandardLibrary {
    fn contains(&self, name: &str) -> bool {
        FUNCTIONS.contains(&name)
    }

    fn call(&self, name: &str, args: &[Value], context: &ScopeContext) -> Option<Value> {
        let arg = |i: usize| args.get(i).unwrap_or(&Value::Null);
        let unary = |f: fn(f64) -> f64| arg(0).as_f64().map_or(Value::Null, |n| number(f(n)));

        let value = match name {
            "abs" => unary(f64::abs),
            "ceil" => unary(f64::ceil),
            "floor" => unary(f64::floor),
            "round" => unary(f64::round),
            "sqrt" => unary(f64::sqrt),
            "pow" => match (arg(0).as_f64(), arg(1).as_f64()) {
                (Some(base), Some(exp)) => number(base.powf(exp)),
                _ => Value::Null,
            },
            "min" => fold_numbers(args, f64::min),
            "max" => fold_numbers(args, f64::max),
            "length" => match arg(0) {
                Value::String(s) => Value::from(s.chars().count()),
                Value::Array(items) => Value::from(items.len()),
                _ => Value::Null,
            },
            "upper" => arg(0)
                .as_str()
                .map_or(Value::Null, |s| Value::String(s.to_uppercase())),
            "lower" => arg(0)
                .as_str()
                .map_or(Value::Null, |s| Value::String(s.to_lowercase())),
            "isValid" => Value::Bool(match arg(0) {
                Value::Null => false,
                Value::Number(n) => n.as_f64().is_some_and(|f| !f.is_nan()),
                _ => true,
            }),
            "toString" => match arg(0) {
                Value::Null => Value::Null,
                other => Value::String(display(other)),
            },
            "toNumber" => match arg(0) {
                Value::Number(_) => arg(0).clone(),
                Value::Bool(b) => Value::from(u8::from(*b)),
                Value::String(s) => s.trim().parse::<f64>().map_or(Value::Null, number),
                _ => Value::Null,
            },
            "itemPath" => Value::Array(context.item_path.iter().map(|&i| Value::from(i)).collect()),
            "itemIndex" => context.item_index().map_or(Value::Null, Value::from),
            "depth" => Value::from(context.depth()),
            _ => return None,
        };
        Some(value)
    }
}

/// Folds every numeric argument; `null` when there are none.
fn fold_numbers(args: &[Value], f: fn(f64, f64) -> f64) -> Value {
    args.iter()
        .filter_map(Value::as_f64)
        .reduce(f)
        .map_or(Value::Null, number)
}
