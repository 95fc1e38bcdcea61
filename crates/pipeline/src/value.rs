//! Document value semantics: path lookup, comparison and ordering.
//!
//! Values of different types never compare equal or ordered in predicates.
//! For sorting, types are ranked: missing/null < numbers < strings <
//! objects < arrays < booleans.

use ordered_float::OrderedFloat;
use procure_core::{Document, Value};
use std::cmp::Ordering;

/// Resolve a dotted path. Any missing or non-object step yields `None`.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Whether a value is absent or null.
#[inline]
pub fn is_nullish(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_null)
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Equality with numeric coercion (`1 == 1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => a == b,
    }
}

/// Same-type comparison used by range predicates.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            Some(OrderedFloat(x.as_f64()?).cmp(&OrderedFloat(y.as_f64()?)))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order over optional values, used by sort stages.
pub fn total_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Some(Value::Object(x)), Some(Value::Object(y))) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y) {
                let ord = ka.cmp(kb).then_with(|| total_cmp(Some(va), Some(vb)));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (va, vb) in x.iter().zip(y) {
                let ord = total_cmp(Some(va), Some(vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Canonical string for hashing group keys; equal values map to equal keys.
pub fn canonical_key(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push('~'),
        Value::Bool(b) => out.push_str(if *b { "t" } else { "f" }),
        Value::Number(n) => {
            out.push('n');
            match n.as_i64() {
                Some(i) => out.push_str(&i.to_string()),
                None => out.push_str(&n.as_f64().unwrap_or(f64::NAN).to_string()),
            }
        }
        Value::String(s) => {
            out.push('s');
            out.push_str(&s.len().to_string());
            out.push(':');
            out.push_str(s);
        }
        Value::Array(items) => {
            out.push('[');
            for item in items {
                write_canonical(item, out);
                out.push(',');
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (k, v) in map {
                out.push_str(&k.len().to_string());
                out.push(':');
                out.push_str(k);
                write_canonical(v, out);
                out.push(',');
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_get_path() {
        let d = doc(json!({"_id": {"iso": "PT", "cpv": "45"}, "avg": 3.5}));
        assert_eq!(get_path(&d, "_id.iso"), Some(&json!("PT")));
        assert_eq!(get_path(&d, "avg"), Some(&json!(3.5)));
        assert_eq!(get_path(&d, "_id.missing"), None);
        assert_eq!(get_path(&d, "avg.deeper"), None);
    }

    #[test]
    fn test_compare_same_bracket_only() {
        assert_eq!(compare(&json!(2008), &json!(2010.0)), Some(Ordering::Less));
        assert_eq!(compare(&json!("a"), &json!("b")), Some(Ordering::Less));
        assert_eq!(compare(&json!("2010"), &json!(2010)), None);
        assert_eq!(compare(&Value::Null, &json!(1)), None);
    }

    #[test]
    fn test_numeric_equality() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!("1"), &json!(1)));
        assert!(values_equal(&json!({"a": 1}), &json!({"a": 1.0})));
    }

    #[test]
    fn test_total_order_ranks_types() {
        assert_eq!(total_cmp(None, Some(&json!(0))), Ordering::Less);
        assert_eq!(total_cmp(Some(&Value::Null), None), Ordering::Equal);
        assert_eq!(total_cmp(Some(&json!(5)), Some(&json!("a"))), Ordering::Less);
        assert_eq!(total_cmp(Some(&json!(5.5)), Some(&json!(5))), Ordering::Greater);
    }

    #[test]
    fn test_canonical_key_normalizes_numbers() {
        assert_eq!(canonical_key(&json!(3)), canonical_key(&json!(3.0)));
        assert_ne!(canonical_key(&json!("3")), canonical_key(&json!(3)));
        assert_ne!(canonical_key(&Value::Null), canonical_key(&json!("")));
    }
}
