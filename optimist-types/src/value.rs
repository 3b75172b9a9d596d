//! Value lookup and ordering
//!
//! Filters use [`compare_values`], which only orders values of the same
//! kind. Sorts use [`total_cmp`], which orders everything:
//! missing < null < bool < number < string < array < object.

use crate::Fields;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Resolve a dotted field path (`a.b.c`) inside a field map
pub fn lookup<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    if let Some(value) = fields.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn cmp_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return Some(a.cmp(&b));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Compare two values of the same kind; `None` for mixed kinds
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => cmp_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            if values_equal(a, b) {
                Some(Ordering::Equal)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Deep equality that treats `1` and `1.0` as equal
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => cmp_numbers(a, b) == Some(Ordering::Equal),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order over optional values, used for sorting and cursors
pub fn total_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let by_rank = rank(a).cmp(&rank(b));
    if by_rank != Ordering::Equal {
        return by_rank;
    }

    match (a, b) {
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            for (x, y) in a.iter().zip(b) {
                let ord = total_cmp(Some(x), Some(y));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            // Compare canonical text; objects rarely appear in sort keys.
            a.len()
                .cmp(&b.len())
                .then_with(|| Value::Object(a.clone()).to_string().cmp(&Value::Object(b.clone()).to_string()))
        }
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_dotted() {
        let fields = json!({"a": {"b": {"c": 3}}, "x.y": 1});
        let fields = fields.as_object().unwrap();

        assert_eq!(lookup(fields, "a.b.c"), Some(&json!(3)));
        assert_eq!(lookup(fields, "x.y"), Some(&json!(1)));
        assert_eq!(lookup(fields, "a.missing"), None);
    }

    #[test]
    fn test_compare_mixed_kinds() {
        assert_eq!(compare_values(&json!(1), &json!("1")), None);
        assert_eq!(compare_values(&json!(1), &json!(2.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("b"), &json!("a")), Some(Ordering::Greater));
    }

    #[test]
    fn test_values_equal_numbers() {
        assert!(values_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
        assert!(!values_equal(&json!([1]), &json!([1, 2])));
    }

    #[test]
    fn test_total_order_ranks() {
        assert_eq!(total_cmp(None, Some(&json!(null))), Ordering::Less);
        assert_eq!(total_cmp(Some(&json!(true)), Some(&json!(0))), Ordering::Less);
        assert_eq!(total_cmp(Some(&json!(10)), Some(&json!("a"))), Ordering::Less);
        assert_eq!(total_cmp(Some(&json!([1, 2])), Some(&json!([1, 3]))), Ordering::Less);
    }
}
