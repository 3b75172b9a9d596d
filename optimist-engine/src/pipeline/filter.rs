//! Where-clause evaluation

use crate::descriptor::{Operator, WhereClause};
use optimist_types::{compare_values, values_equal, Document};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Pseudo-field naming the document id
pub const DOCUMENT_ID: &str = "__name__";

/// Value of `field` on `doc`; `__name__` resolves to the id
pub(crate) fn field_value<'d>(doc: &'d Document, field: &str) -> Option<Cow<'d, Value>> {
    if field == DOCUMENT_ID {
        return Some(Cow::Owned(Value::String(doc.id.0.clone())));
    }
    doc.get(field).map(Cow::Borrowed)
}

fn contains(field: Option<&Value>, value: &Value) -> bool {
    match field {
        Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, value)),
        _ => false,
    }
}

fn compare(field: Option<&Value>, value: &Value) -> Option<Ordering> {
    compare_values(field?, value)
}

/// Whether `doc` satisfies a single clause
pub fn matches(doc: &Document, clause: &WhereClause) -> bool {
    let field = field_value(doc, clause.field());
    let field = field.as_deref();
    let value = clause.value();

    match clause.op() {
        Operator::Always => true,
        Operator::Lt => compare(field, value) == Some(Ordering::Less),
        Operator::Lte => matches!(compare(field, value), Some(Ordering::Less | Ordering::Equal)),
        Operator::Eq => field.is_some_and(|field| values_equal(field, value)),
        Operator::NotEq => !field.is_some_and(|field| values_equal(field, value)),
        Operator::Gte => matches!(compare(field, value), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Gt => compare(field, value) == Some(Ordering::Greater),
        // `in` keeps the array-contains direction.
        Operator::ArrayContains | Operator::In => contains(field, value),
        Operator::ArrayContainsAny => value
            .as_array()
            .is_some_and(|candidates| candidates.iter().any(|candidate| contains(field, candidate))),
        Operator::NotIn => !contains(field, value),
    }
}

/// Whether `doc` satisfies every clause
pub fn matches_all(doc: &Document, clauses: &[WhereClause]) -> bool {
    clauses.iter().all(|clause| matches(doc, clause))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        let fields = json!({
            "name": "ada",
            "age": 36,
            "tags": ["math", "engines"],
            "address": {"city": "London"}
        });
        Document::new("people".into(), "ada".into(), fields.as_object().unwrap().clone())
    }

    fn check(field: &str, op: Operator, value: Value) -> bool {
        matches(&doc(), &WhereClause::new(field, op, value))
    }

    #[test]
    fn test_comparisons() {
        assert!(check("age", Operator::Gt, json!(30)));
        assert!(check("age", Operator::Gte, json!(36)));
        assert!(check("age", Operator::Lte, json!(36.0)));
        assert!(!check("age", Operator::Lt, json!(36)));
        assert!(check("name", Operator::Eq, json!("ada")));
        assert!(check("name", Operator::NotEq, json!("grace")));
    }

    #[test]
    fn test_mixed_kinds_never_order() {
        assert!(!check("age", Operator::Lt, json!("99")));
        assert!(!check("age", Operator::Gte, json!("0")));
        assert!(check("age", Operator::NotEq, json!("36")));
    }

    #[test]
    fn test_missing_field() {
        assert!(!check("missing", Operator::Eq, json!(null)));
        assert!(check("missing", Operator::NotEq, json!(1)));
        assert!(!check("missing", Operator::Lt, json!(1)));
    }

    #[test]
    fn test_dotted_field_and_document_id() {
        assert!(check("address.city", Operator::Eq, json!("London")));
        assert!(check(DOCUMENT_ID, Operator::Eq, json!("ada")));
    }

    #[test]
    fn test_array_operators() {
        assert!(check("tags", Operator::ArrayContains, json!("math")));
        assert!(check("tags", Operator::ArrayContainsAny, json!(["poetry", "engines"])));
        assert!(!check("tags", Operator::ArrayContainsAny, json!("engines")));
    }

    #[test]
    fn test_in_keeps_array_contains_direction() {
        assert!(check("tags", Operator::In, json!("math")));
        // A list of candidate values against a scalar field does not match.
        assert!(!check("name", Operator::In, json!(["ada", "grace"])));
        assert!(check("name", Operator::NotIn, json!(["ada", "grace"])));
        assert!(!check("tags", Operator::NotIn, json!("math")));
    }

    #[test]
    fn test_always() {
        assert!(check("anything", Operator::Always, json!(null)));
    }
}
