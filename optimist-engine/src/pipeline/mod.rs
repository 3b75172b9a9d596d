//! Query transducer pipeline
//!
//! A query result is derived from the two stores in fixed stages:
//!
//! 1. **join**: overlay the collections named by populates
//! 2. **lift**: collect confirmed documents of the target collection(s);
//!    once the remote has reported an order, only the documents it placed
//! 3. **overlay**: apply pending overrides (patches merge, removals drop).
//!    A patched document joins the working set even if the remote never
//!    placed it
//! 4. **filter**: keep documents satisfying every where clause
//! 5. **order**: sort by `orderBy`, or keep the remote's order when nothing
//!    was overlaid
//! 6. **paginate**: cursor bounds, then `limit`
//!
//! Documents are borrowed from the document store until a stage has to
//! change them, so a query with no pending overrides copies nothing.

pub mod filter;
pub mod order;
pub mod populate;

use crate::descriptor::{QueryDescriptor, Target};
use crate::store::{DocumentStore, Override, OverrideStore};
use optimist_types::{CollectionPath, DocId, DocKey, Document};
use populate::Joins;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Documents flowing between stages, in key order
pub(crate) type Working<'a> = BTreeMap<DocKey, Cow<'a, Document>>;

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Via {
    /// Confirmed state only
    Cache,
    /// Pending overrides were applied
    Optimistic,
    /// Confirmed state, narrowed locally by a cursor
    Memory,
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Via::Cache => "cache",
            Via::Optimistic => "optimistic",
            Via::Memory => "memory",
        };
        f.write_str(name)
    }
}

fn lift_into<'a>(
    working: &mut Working<'a>,
    path: &CollectionPath,
    database: &'a DocumentStore,
    only: Option<&DocId>,
) {
    let Some(docs) = database.collection(path) else {
        return;
    };
    match only {
        Some(id) => {
            if let Some(doc) = docs.get(id) {
                working.insert(doc.key(), Cow::Borrowed(doc));
            }
        }
        None => working.extend(docs.values().map(|doc| (doc.key(), Cow::Borrowed(doc)))),
    }
}

/// Lift only the documents of `path` the remote placed
fn lift_placed<'a>(
    working: &mut Working<'a>,
    path: &CollectionPath,
    database: &'a DocumentStore,
    confirmed: &[DocKey],
    only: Option<&DocId>,
) {
    for key in confirmed.iter().filter(|key| key.path() == path) {
        if only.is_some_and(|only| only != key.id()) {
            continue;
        }
        if let Some(doc) = database.get(key.path(), key.id()) {
            working.insert(key.clone(), Cow::Borrowed(doc));
        }
    }
}

/// Apply pending overrides under `path`; returns whether any applied
fn overlay_into<'a>(
    working: &mut Working<'a>,
    path: &CollectionPath,
    database: &'a DocumentStore,
    overrides: &OverrideStore,
    only: Option<&DocId>,
) -> bool {
    let Some(pending) = overrides.collection(path) else {
        return false;
    };

    let mut applied = false;
    for (id, entry) in pending {
        if only.is_some_and(|only| only != id) {
            continue;
        }
        applied = true;
        let key = DocKey(path.clone(), id.clone());
        match entry {
            Override::Removed => {
                working.remove(&key);
            }
            Override::Patch(patch) => working
                .entry(key)
                .or_insert_with(|| match database.get(path, id) {
                    Some(doc) => Cow::Borrowed(doc),
                    None => Cow::Owned(Document::empty(path.clone(), id.clone())),
                })
                .to_mut()
                .merge(patch),
        }
    }
    applied
}

/// Lift and overlay a single collection
pub(crate) fn lift_collection<'a>(
    path: &CollectionPath,
    database: &'a DocumentStore,
    overrides: &OverrideStore,
    only: Option<&DocId>,
) -> (Working<'a>, bool) {
    let mut working = Working::new();
    lift_into(&mut working, path, database, only);
    let overlaid = overlay_into(&mut working, path, database, overrides, only);
    (working, overlaid)
}

/// Ordered keys and provenance of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub ordered: Vec<DocKey>,
    pub via: Via,
    /// Whether overrides forced the overlay and sort stages
    pub full_path: bool,
}

/// Derived documents of one evaluation, still borrowing the store
#[derive(Debug)]
pub struct Evaluation<'a> {
    pub docs: Vec<Cow<'a, Document>>,
    pub via: Via,
    pub full_path: bool,
}

/// Evaluates one query against the stores
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    descriptor: &'a QueryDescriptor,
    database: &'a DocumentStore,
    overrides: &'a OverrideStore,
    confirmed: Option<&'a [DocKey]>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        descriptor: &'a QueryDescriptor,
        database: &'a DocumentStore,
        overrides: &'a OverrideStore,
    ) -> Self {
        Pipeline {
            descriptor,
            database,
            overrides,
            confirmed: None,
        }
    }

    /// Order last reported by the remote
    ///
    /// Restricts the lift to these documents and is trusted as the result
    /// order when nothing is overlaid. Without it the whole target is lifted
    /// and sorted.
    pub fn with_confirmed(mut self, confirmed: &'a [DocKey]) -> Self {
        self.confirmed = Some(confirmed);
        self
    }

    fn lift_paths(&self) -> Vec<CollectionPath> {
        match self.descriptor.target() {
            Target::Collection(path) => vec![path],
            target @ Target::Group(_) => {
                let paths: BTreeSet<&CollectionPath> = self
                    .database
                    .paths()
                    .chain(self.overrides.paths())
                    .filter(|path| target.matches(path))
                    .collect();
                paths.into_iter().cloned().collect()
            }
        }
    }

    pub fn evaluate(&self) -> Evaluation<'a> {
        let descriptor = self.descriptor;
        let joins = Joins::prepare(&descriptor.populates, self.database, self.overrides);
        let only = descriptor.target_doc();

        let mut working = Working::new();
        let mut overlaid = false;
        for path in self.lift_paths() {
            match self.confirmed {
                Some(confirmed) => {
                    lift_placed(&mut working, &path, self.database, confirmed, only.as_ref())
                }
                None => lift_into(&mut working, &path, self.database, only.as_ref()),
            }
            overlaid |= overlay_into(
                &mut working,
                &path,
                self.database,
                self.overrides,
                only.as_ref(),
            );
        }
        let full_path = overlaid || joins.optimistic();

        let mut docs: Vec<Cow<'a, Document>> = working.into_values().collect();
        if !joins.is_empty() {
            for doc in &mut docs {
                joins.attach(doc);
            }
        }

        docs.retain(|doc| filter::matches_all(doc, &descriptor.filters));

        match self.confirmed {
            Some(confirmed) if !full_path => docs = order::trusted(docs, confirmed),
            _ => order::sort(&mut docs, &descriptor.order_by),
        }

        let cursor_applied = order::paginate(&mut docs, descriptor);
        let via = if full_path {
            Via::Optimistic
        } else if cursor_applied {
            Via::Memory
        } else {
            Via::Cache
        };

        Evaluation {
            docs,
            via,
            full_path,
        }
    }

    /// Ordered keys of the result
    pub fn run(&self) -> PipelineOutput {
        let evaluation = self.evaluate();
        PipelineOutput {
            ordered: evaluation.docs.iter().map(|doc| doc.key()).collect(),
            via: evaluation.via,
            full_path: evaluation.full_path,
        }
    }

    /// Result documents, projected to `fields` when the query names them
    pub fn materialize(&self) -> Vec<Document> {
        let fields = self.descriptor.fields.as_deref();
        self.evaluate()
            .docs
            .into_iter()
            .map(|doc| project(doc.into_owned(), fields))
            .collect()
    }
}

fn project(mut doc: Document, fields: Option<&[String]>) -> Document {
    if let Some(fields) = fields {
        doc.fields.retain(|name, _| fields.iter().any(|field| field == name));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{OrderBy, Operator, Populate, WhereClause};
    use optimist_types::Fields;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    fn store(path: &str, docs: &[(&str, Value)]) -> DocumentStore {
        let mut database = DocumentStore::new();
        for (id, value) in docs {
            database.set(
                path.into(),
                (*id).into(),
                Document::new(path.into(), (*id).into(), fields(value.clone())),
            );
        }
        database
    }

    fn ids(output: &PipelineOutput) -> Vec<&str> {
        output.ordered.iter().map(|key| key.id().as_str()).collect()
    }

    fn people() -> DocumentStore {
        store(
            "people",
            &[
                ("ada", json!({"age": 36})),
                ("bo", json!({"age": 12})),
                ("cy", json!({"age": 50})),
            ],
        )
    }

    #[test]
    fn test_confirmed_only_is_cache() {
        let database = people();
        let overrides = OverrideStore::new();
        let query = QueryDescriptor::collection("people")
            .with_where(WhereClause::new("age", Operator::Gte, json!(18)))
            .with_order(OrderBy::desc("age"));

        let output = Pipeline::new(&query, &database, &overrides).run();
        assert_eq!(ids(&output), ["cy", "ada"]);
        assert_eq!(output.via, Via::Cache);
        assert!(!output.full_path);
    }

    #[test]
    fn test_overlay_patch_remove_and_create() {
        let database = people();
        let mut overrides = OverrideStore::new();
        overrides.merge("people".into(), "bo".into(), Override::Patch(fields(json!({"age": 40}))));
        overrides.merge("people".into(), "cy".into(), Override::Removed);
        overrides.merge("people".into(), "di".into(), Override::Patch(fields(json!({"age": 20}))));

        let query = QueryDescriptor::collection("people").with_order(OrderBy::asc("age"));
        let output = Pipeline::new(&query, &database, &overrides).run();
        assert_eq!(ids(&output), ["di", "ada", "bo"]);
        assert_eq!(output.via, Via::Optimistic);
        assert!(output.full_path);
    }

    #[test]
    fn test_fast_path_keeps_remote_order() {
        let database = people();
        let overrides = OverrideStore::new();
        let query = QueryDescriptor::collection("people").with_order(OrderBy::asc("age"));
        let confirmed = vec![
            DocKey::new("people", "cy"),
            DocKey::new("people", "bo"),
            DocKey::new("people", "ada"),
        ];

        let output = Pipeline::new(&query, &database, &overrides)
            .with_confirmed(&confirmed)
            .run();
        assert_eq!(ids(&output), ["cy", "bo", "ada"]);
    }

    #[test]
    fn test_remote_order_bounds_the_lift() {
        let database = people();
        let mut overrides = OverrideStore::new();
        let query = QueryDescriptor::collection("people").with_order(OrderBy::asc("age"));
        let confirmed = vec![DocKey::new("people", "cy")];

        let output = Pipeline::new(&query, &database, &overrides)
            .with_confirmed(&confirmed)
            .run();
        assert_eq!(ids(&output), ["cy"]);

        // A patched document the remote never placed shows up with its stored fields.
        overrides.merge("people".into(), "bo".into(), Override::Patch(fields(json!({"nick": "b"}))));
        let pipeline = Pipeline::new(&query, &database, &overrides).with_confirmed(&confirmed);
        assert_eq!(ids(&pipeline.run()), ["bo", "cy"]);
        let docs = pipeline.materialize();
        assert_eq!(docs[0].get("age"), Some(&json!(12)));
        assert_eq!(docs[0].get("nick"), Some(&json!("b")));
    }

    #[test]
    fn test_cursor_is_memory() {
        let database = people();
        let overrides = OverrideStore::new();
        let mut query = QueryDescriptor::collection("people").with_order(OrderBy::asc("age"));
        query.start_after = Some(vec![json!(12)]);

        let output = Pipeline::new(&query, &database, &overrides).run();
        assert_eq!(ids(&output), ["ada", "cy"]);
        assert_eq!(output.via, Via::Memory);
    }

    #[test]
    fn test_single_doc_query() {
        let database = people();
        let mut overrides = OverrideStore::new();
        overrides.merge("people".into(), "cy".into(), Override::Removed);

        let query = QueryDescriptor::parse("people/ada").unwrap();
        let output = Pipeline::new(&query, &database, &overrides).run();
        assert_eq!(ids(&output), ["ada"]);
        // An override on another doc does not touch this query.
        assert_eq!(output.via, Via::Cache);
    }

    #[test]
    fn test_collection_group_spans_parents() {
        let mut database = store("users/a/posts", &[("p1", json!({"n": 2}))]);
        for (path, id) in [("users/b/posts", "p2"), ("users/b/notes", "n1")] {
            database.set(path.into(), id.into(), Document::new(path.into(), id.into(), fields(json!({"n": 1}))));
        }
        let mut overrides = OverrideStore::new();
        overrides.merge("users/c/posts".into(), "p3".into(), Override::Patch(fields(json!({"n": 0}))));

        let query = QueryDescriptor {
            collection_group: Some("posts".into()),
            order_by: vec![OrderBy::asc("n")],
            ..Default::default()
        };
        let output = Pipeline::new(&query, &database, &overrides).run();
        assert_eq!(ids(&output), ["p3", "p2", "p1"]);
    }

    #[test]
    fn test_populate_and_projection() {
        let mut database = store("posts", &[("p1", json!({"owner": "u1", "title": "Hi", "body": "..."}))]);
        database.set(
            "users".into(),
            "u1".into(),
            Document::new("users".into(), "u1".into(), fields(json!({"name": "Ann"}))),
        );
        let overrides = OverrideStore::new();

        let mut query = QueryDescriptor::collection("posts");
        query.populates = vec![Populate::new("owner", "users")];
        query.fields = Some(vec!["title".into(), "owner".into()]);

        let docs = Pipeline::new(&query, &database, &overrides).materialize();
        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].to_value(),
            json!({
                "id": "p1",
                "path": "posts",
                "title": "Hi",
                "owner": {"id": "u1", "path": "users", "name": "Ann"}
            })
        );
    }

    #[test]
    fn test_filter_on_populated_field() {
        let mut database = store("posts", &[("p1", json!({"owner": "u1"})), ("p2", json!({"owner": "u2"}))]);
        for (id, name) in [("u1", "Ann"), ("u2", "Bo")] {
            database.set("users".into(), id.into(), Document::new("users".into(), id.into(), fields(json!({"name": name}))));
        }
        let overrides = OverrideStore::new();

        let mut query = QueryDescriptor::collection("posts")
            .with_where(WhereClause::new("owner.name", Operator::Eq, json!("Bo")));
        query.populates = vec![Populate::new("owner", "users")];

        let output = Pipeline::new(&query, &database, &overrides).run();
        assert_eq!(ids(&output), ["p2"]);
    }
}
