//! Value Comparison
//!
//! Two policies decide whether a watcher is dirty:
//!
//! - **reference** ([`same_value`]): primitives compare by value, composites
//!   by handle identity. NaN counts as equal to NaN, otherwise a watch that
//!   yields NaN would be dirty on every pass and the digest could never
//!   settle.
//! - **deep** ([`deep_equal`]): recursive structural equality. Objects
//!   compare as key sets, so insertion order does not matter.

use super::Value;

/// Decide whether `new` and `old` are equal under the chosen policy.
pub fn are_equal(new: &Value, old: &Value, deep: bool) -> bool {
    if deep {
        deep_equal(new, old)
    } else {
        same_value(new, old)
    }
}

/// Reference equality.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(*x, *y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => x.ptr_eq(y),
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        _ => false,
    }
}

/// Structural equality.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (x, y) = (x.read(), y.read());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| deep_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.ptr_eq(y) {
                return true;
            }
            let (x, y) = (x.read(), y.read());
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| deep_equal(l, r)))
        }
        _ => same_value(a, b),
    }
}

/// Dirty check against a watcher's stored value. `None` is the
/// never-evaluated state, which is dirty against anything.
pub(crate) fn is_dirty(new: &Value, last: Option<&Value>, deep: bool) -> bool {
    match last {
        None => true,
        Some(old) => !are_equal(new, old, deep),
    }
}

fn numbers_equal(x: f64, y: f64) -> bool {
    x == y || (x.is_nan() && y.is_nan())
}
