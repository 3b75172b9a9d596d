//! Query descriptors and their canonical keys
//!
//! A query arrives either as a path shorthand (`"users/alice/posts"`) or as a
//! structured object. Both normalize into a [`QueryDescriptor`], whose
//! [`key`](QueryDescriptor::key) names the cache slot. Two descriptors that
//! mean the same thing produce the same key.

use crate::error::{EngineError, Result};
use optimist_types::{CollectionPath, DocId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Filter operators
///
/// `In` keeps the membership direction of `ArrayContains`: the document
/// field is the array and the clause value is the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "array-contains")]
    ArrayContains,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "array-contains-any")]
    ArrayContainsAny,
    #[serde(rename = "not-in")]
    NotIn,
    /// Matches every document
    #[serde(rename = "*")]
    Always,
}

/// `[field, op, value]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause(pub String, pub Operator, pub Value);

impl WhereClause {
    pub fn new(field: impl Into<String>, op: Operator, value: Value) -> Self {
        WhereClause(field.into(), op, value)
    }

    pub fn field(&self) -> &str {
        &self.0
    }

    pub fn op(&self) -> Operator {
        self.1
    }

    pub fn value(&self) -> &Value {
        &self.2
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

/// `[field, direction]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy(pub String, pub Direction);

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy(field.into(), Direction::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy(field.into(), Direction::Desc)
    }

    pub fn field(&self) -> &str {
        &self.0
    }

    pub fn direction(&self) -> Direction {
        self.1
    }
}

/// One level of a nested collection path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subcollection {
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

/// Join configuration: resolve `field` as id(s) in `collection` and attach
/// the matches under `alias` (or `field` itself)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PopulateSpec")]
pub struct Populate {
    pub field: String,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Populate {
    pub fn new(field: impl Into<String>, collection: impl Into<String>) -> Self {
        Populate {
            field: field.into(),
            collection: collection.into(),
            alias: None,
        }
    }

    pub fn result_field(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PopulateSpec {
    Short(String),
    Triple(String, String, String),
    Pair(String, String),
    Object {
        #[serde(alias = "child")]
        field: String,
        #[serde(alias = "root")]
        collection: String,
        #[serde(default, alias = "childAlias")]
        alias: Option<String>,
    },
}

impl TryFrom<PopulateSpec> for Populate {
    type Error = String;

    fn try_from(spec: PopulateSpec) -> std::result::Result<Self, Self::Error> {
        match spec {
            PopulateSpec::Short(text) => match text.split_once(':') {
                Some((field, collection)) if !field.is_empty() && !collection.is_empty() => {
                    Ok(Populate::new(field, collection))
                }
                _ => Err(format!("populate `{text}` must look like `field:collection`")),
            },
            PopulateSpec::Triple(field, collection, alias) => Ok(Populate {
                field,
                collection,
                alias: Some(alias),
            }),
            PopulateSpec::Pair(field, collection) => Ok(Populate::new(field, collection)),
            PopulateSpec::Object {
                field,
                collection,
                alias,
            } => Ok(Populate {
                field,
                collection,
                alias,
            }),
        }
    }
}

/// Canonical query description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcollections: Vec<Subcollection>,
    #[serde(
        default,
        rename = "where",
        deserialize_with = "deserialize_where",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub filters: Vec<WhereClause>,
    #[serde(
        default,
        deserialize_with = "deserialize_order",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(
        default,
        deserialize_with = "deserialize_cursor",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_at: Option<Vec<Value>>,
    #[serde(
        default,
        deserialize_with = "deserialize_cursor",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_after: Option<Vec<Value>>,
    #[serde(
        default,
        deserialize_with = "deserialize_cursor",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_at: Option<Vec<Value>>,
    #[serde(
        default,
        deserialize_with = "deserialize_cursor",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_before: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub populates: Vec<Populate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_as: Option<String>,
}

/// A query as callers write it: path shorthand or structured object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuerySpec {
    Path(String),
    Descriptor(Box<QueryDescriptor>),
}

impl From<&str> for QuerySpec {
    fn from(path: &str) -> Self {
        QuerySpec::Path(path.to_string())
    }
}

impl From<QueryDescriptor> for QuerySpec {
    fn from(descriptor: QueryDescriptor) -> Self {
        QuerySpec::Descriptor(Box::new(descriptor))
    }
}

/// What a query reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Collection(CollectionPath),
    /// Every collection whose last segment is this name
    Group(String),
}

impl Target {
    pub fn matches(&self, path: &CollectionPath) -> bool {
        match self {
            Target::Collection(target) => target == path,
            Target::Group(group) => path.group() == group,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Collection(path) => write!(f, "{}", path),
            Target::Group(group) => write!(f, "*/{}", group),
        }
    }
}

impl QueryDescriptor {
    /// Descriptor for a plain collection
    pub fn collection(collection: impl Into<String>) -> Self {
        QueryDescriptor {
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    pub fn with_where(mut self, clause: WhereClause) -> Self {
        self.filters.push(clause);
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_store_as(mut self, store_as: impl Into<String>) -> Self {
        self.store_as = Some(store_as.into());
        self
    }

    /// Parse path shorthand: `collection[/doc[/subcollection[/doc]...]]`
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(EngineError::MissingCollection);
        }
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(EngineError::InvalidQuery(format!(
                "path `{path}` has an empty segment"
            )));
        }

        let mut pairs = segments.chunks(2);
        let mut descriptor = match pairs.next() {
            Some(first) => QueryDescriptor {
                collection: Some(first[0].to_string()),
                doc: first.get(1).map(|doc| doc.to_string()),
                ..Default::default()
            },
            None => return Err(EngineError::MissingCollection),
        };
        for pair in pairs {
            descriptor.subcollections.push(Subcollection {
                collection: pair[0].to_string(),
                doc: pair.get(1).map(|doc| doc.to_string()),
            });
        }
        Ok(descriptor)
    }

    /// Turn a query spec into a validated descriptor
    pub fn normalize(spec: QuerySpec) -> Result<Self> {
        let descriptor = match spec {
            QuerySpec::Path(path) => Self::parse(&path)?,
            QuerySpec::Descriptor(descriptor) => *descriptor,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.collection, &self.collection_group) {
            (None, None) => return Err(EngineError::MissingCollection),
            (Some(collection), _) if collection.is_empty() => {
                return Err(EngineError::MissingCollection)
            }
            (None, Some(_)) if self.doc.is_some() || !self.subcollections.is_empty() => {
                return Err(EngineError::InvalidQuery(
                    "collection group queries cannot name a doc or subcollections".into(),
                ))
            }
            _ => {}
        }

        let mut parent_doc = self.doc.as_ref();
        for sub in &self.subcollections {
            if parent_doc.is_none() {
                return Err(EngineError::InvalidQuery(format!(
                    "subcollection `{}` needs a parent doc",
                    sub.collection
                )));
            }
            parent_doc = sub.doc.as_ref();
        }
        Ok(())
    }

    /// Collection or collection group this query reads
    pub fn target(&self) -> Target {
        let Some(collection) = &self.collection else {
            return Target::Group(self.collection_group.clone().unwrap_or_default());
        };

        let mut path = CollectionPath::new(collection.clone());
        let mut parent_doc = self.doc.clone();
        for sub in &self.subcollections {
            if let Some(doc) = parent_doc {
                path = path.child(&DocId::new(doc), &sub.collection);
            }
            parent_doc = sub.doc.clone();
        }
        Target::Collection(path)
    }

    /// Doc id when the query names a single document
    pub fn target_doc(&self) -> Option<DocId> {
        match self.subcollections.last() {
            Some(sub) => sub.doc.clone().map(DocId),
            None => self.doc.clone().map(DocId),
        }
    }

    /// Collections joined in by populates
    pub fn populate_paths(&self) -> impl Iterator<Item = CollectionPath> + '_ {
        self.populates
            .iter()
            .map(|populate| CollectionPath::new(populate.collection.clone()))
    }

    /// Whether a change under `path` can alter this query's result
    pub fn depends_on(&self, path: &CollectionPath) -> bool {
        self.target().matches(path) || self.populate_paths().any(|p| &p == path)
    }

    /// True if any cursor bound is set
    pub fn has_cursor(&self) -> bool {
        self.start_at.is_some()
            || self.start_after.is_some()
            || self.end_at.is_some()
            || self.end_before.is_some()
    }

    /// Canonical cache key
    pub fn key(&self) -> String {
        if let Some(store_as) = &self.store_as {
            return store_as.clone();
        }

        let mut key = self
            .collection
            .clone()
            .or_else(|| self.collection_group.clone())
            .unwrap_or_default();
        if let Some(doc) = &self.doc {
            key.push('/');
            key.push_str(doc);
        }
        for sub in &self.subcollections {
            key.push('/');
            key.push_str(&sub.collection);
            if let Some(doc) = &sub.doc {
                key.push('/');
                key.push_str(doc);
            }
        }

        let mut params = Vec::new();
        if !self.filters.is_empty() {
            let mut clauses: Vec<String> = self.filters.iter().map(compact).collect();
            clauses.sort();
            params.push(format!("where=[{}]", clauses.join(",")));
        }
        if !self.order_by.is_empty() {
            params.push(format!("orderBy={}", compact(&self.order_by)));
        }
        if let Some(limit) = self.limit {
            params.push(format!("limit={limit}"));
        }
        let cursors = [
            ("startAt", &self.start_at),
            ("startAfter", &self.start_after),
            ("endAt", &self.end_at),
            ("endBefore", &self.end_before),
        ];
        for (name, cursor) in cursors {
            if let Some(values) = cursor {
                params.push(format!("{name}={}", compact(values)));
            }
        }
        if let Some(fields) = &self.fields {
            params.push(format!("fields={}", compact(fields)));
        }
        if !self.populates.is_empty() {
            params.push(format!("populates={}", compact(&self.populates)));
        }

        if !params.is_empty() {
            key.push('?');
            key.push_str(&params.join("&"));
        }
        if self.collection.is_none() {
            // Keep group queries apart from a same-named top-level collection.
            key.insert_str(0, "group:");
        }
        key
    }
}

fn compact<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WhereSpec {
    One(WhereClause),
    Many(Vec<WhereClause>),
}

fn deserialize_where<'de, D>(deserializer: D) -> std::result::Result<Vec<WhereClause>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<WhereSpec>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(WhereSpec::One(clause)) => vec![clause],
        Some(WhereSpec::Many(clauses)) => clauses,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderEntry {
    Field(String),
    Pair(String, Direction),
    Bare((String,)),
}

impl From<OrderEntry> for OrderBy {
    fn from(entry: OrderEntry) -> Self {
        match entry {
            OrderEntry::Field(field) | OrderEntry::Bare((field,)) => OrderBy::asc(field),
            OrderEntry::Pair(field, direction) => OrderBy(field, direction),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderSpec {
    One(OrderEntry),
    Many(Vec<OrderEntry>),
}

fn deserialize_order<'de, D>(deserializer: D) -> std::result::Result<Vec<OrderBy>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OrderSpec>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OrderSpec::One(entry)) => vec![entry.into()],
        Some(OrderSpec::Many(entries)) => entries.into_iter().map(Into::into).collect(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CursorSpec {
    Many(Vec<Value>),
    One(Value),
}

fn deserialize_cursor<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<CursorSpec>::deserialize(deserializer)? {
        None => None,
        Some(CursorSpec::Many(values)) => Some(values),
        Some(CursorSpec::One(value)) => Some(vec![value]),
    })
}
