//! Sorting and cursor pagination

use super::filter::{field_value, DOCUMENT_ID};
use crate::descriptor::{Direction, OrderBy, QueryDescriptor};
use optimist_types::{total_cmp, DocKey, Document};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

fn directed(ord: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Asc => ord,
        Direction::Desc => ord.reverse(),
    }
}

/// Compare two documents by `order_by`, in priority order
pub fn compare(a: &Document, b: &Document, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let left = field_value(a, order.field());
        let right = field_value(b, order.field());
        let ord = directed(total_cmp(left.as_deref(), right.as_deref()), order.direction());
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable sort; documents arrive in key order so ties fall back to the id
pub fn sort(docs: &mut [Cow<'_, Document>], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }
    docs.sort_by(|a, b| compare(a, b, order_by));
}

/// Arrange documents in the order the remote last reported
///
/// Documents the remote has not placed are dropped.
pub fn trusted<'a>(docs: Vec<Cow<'a, Document>>, confirmed: &[DocKey]) -> Vec<Cow<'a, Document>> {
    let position: HashMap<&DocKey, usize> = confirmed
        .iter()
        .enumerate()
        .map(|(index, key)| (key, index))
        .collect();

    let mut placed: Vec<(usize, Cow<'a, Document>)> = docs
        .into_iter()
        .filter_map(|doc| position.get(&doc.key()).map(|&index| (index, doc)))
        .collect();
    placed.sort_by_key(|(index, _)| *index);
    placed.into_iter().map(|(_, doc)| doc).collect()
}

/// Position of `doc` relative to a cursor
fn cursor_cmp(doc: &Document, cursor: &[Value], order_by: &[OrderBy]) -> Ordering {
    for (index, value) in cursor.iter().enumerate() {
        let (field, direction) = order_by
            .get(index)
            .map(|order| (order.field(), order.direction()))
            .unwrap_or((DOCUMENT_ID, Direction::Asc));
        let current = field_value(doc, field);
        let ord = directed(total_cmp(current.as_deref(), Some(value)), direction);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Apply cursor bounds and `limit`; returns whether a cursor was used
pub fn paginate(docs: &mut Vec<Cow<'_, Document>>, descriptor: &QueryDescriptor) -> bool {
    let order_by = &descriptor.order_by;
    let bounds: [(&Option<Vec<Value>>, fn(Ordering) -> bool); 4] = [
        (&descriptor.start_at, |ord| ord != Ordering::Less),
        (&descriptor.start_after, |ord| ord == Ordering::Greater),
        (&descriptor.end_at, |ord| ord != Ordering::Greater),
        (&descriptor.end_before, |ord| ord == Ordering::Less),
    ];

    for (cursor, keep) in bounds {
        if let Some(cursor) = cursor {
            docs.retain(|doc| keep(cursor_cmp(doc, cursor, order_by)));
        }
    }

    if let Some(limit) = descriptor.limit {
        docs.truncate(limit);
    }
    descriptor.has_cursor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Cow<'static, Document> {
        Cow::Owned(Document::new("c".into(), id.into(), fields.as_object().unwrap().clone()))
    }

    fn ids(docs: &[Cow<'_, Document>]) -> Vec<String> {
        docs.iter().map(|doc| doc.id.0.clone()).collect()
    }

    fn numbered() -> Vec<Cow<'static, Document>> {
        vec![
            doc("a", json!({"n": 3})),
            doc("b", json!({"n": 1})),
            doc("c", json!({"n": 2})),
            doc("d", json!({"n": 4})),
        ]
    }

    #[test]
    fn test_sort_multi_field() {
        let mut docs = vec![
            doc("a", json!({"group": 1, "n": 1})),
            doc("b", json!({"group": 2, "n": 5})),
            doc("c", json!({"group": 1, "n": 9})),
        ];
        sort(&mut docs, &[OrderBy::desc("group"), OrderBy::asc("n")]);
        assert_eq!(ids(&docs), ["b", "a", "c"]);
    }

    #[test]
    fn test_sort_missing_first_ascending() {
        let mut docs = vec![doc("a", json!({"n": 1})), doc("b", json!({}))];
        sort(&mut docs, &[OrderBy::asc("n")]);
        assert_eq!(ids(&docs), ["b", "a"]);
    }

    #[test]
    fn test_trusted_keeps_remote_order() {
        let confirmed = vec![DocKey::new("c", "c"), DocKey::new("c", "a")];
        let docs = vec![doc("a", json!({"n": 1})), doc("c", json!({"n": 2}))];
        assert_eq!(ids(&trusted(docs, &confirmed)), ["c", "a"]);
    }

    #[test]
    fn test_trusted_drops_unplaced() {
        let confirmed = vec![DocKey::new("c", "c"), DocKey::new("c", "b")];
        assert_eq!(ids(&trusted(numbered(), &confirmed)), ["c", "b"]);
    }

    #[test]
    fn test_cursors() {
        let order = vec![OrderBy::asc("n")];
        let mut query = QueryDescriptor::collection("c");
        query.order_by = order.clone();
        query.start_after = Some(vec![json!(1)]);
        query.end_at = Some(vec![json!(3)]);

        let mut docs = numbered();
        sort(&mut docs, &order);
        assert!(paginate(&mut docs, &query));
        assert_eq!(ids(&docs), ["c", "a"]);
    }

    #[test]
    fn test_cursor_on_document_id_without_order() {
        let mut query = QueryDescriptor::collection("c");
        query.start_at = Some(vec![json!("c")]);

        let mut docs = numbered();
        assert!(paginate(&mut docs, &query));
        assert_eq!(ids(&docs), ["c", "d"]);
    }

    #[test]
    fn test_limit_without_cursor() {
        let query = QueryDescriptor::collection("c").with_limit(2);
        let mut docs = numbered();
        assert!(!paginate(&mut docs, &query));
        assert_eq!(ids(&docs), ["a", "b"]);
    }

    #[test]
    fn test_descending_end_before() {
        let order = vec![OrderBy::desc("n")];
        let mut query = QueryDescriptor::collection("c");
        query.order_by = order.clone();
        query.end_before = Some(vec![json!(2)]);

        let mut docs = numbered();
        sort(&mut docs, &order);
        paginate(&mut docs, &query);
        assert_eq!(ids(&docs), ["d", "a"]);
    }
}
