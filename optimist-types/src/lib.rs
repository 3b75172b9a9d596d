//! Shared types for optimist
//!
//! This crate provides the identifiers and document representation used
//! across the optimist workspace, plus the value ordering that filters and
//! sorts agree on.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod value;

pub use value::{compare_values, lookup, total_cmp, values_equal};

/// Field map of a document
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Collection path, e.g. `users` or `users/alice/posts`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionPath(pub String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, which names the collection group
    pub fn group(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Path of a subcollection below `doc` in this collection
    pub fn child(&self, doc: &DocId, collection: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}/{}", self.0, doc.0, collection))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionPath {
    fn from(path: &str) -> Self {
        CollectionPath(path.to_string())
    }
}

/// Document identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        DocId(id.to_string())
    }
}

/// `(path, id)` pair; serialized as a two element array
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey(pub CollectionPath, pub DocId);

impl DocKey {
    pub fn new(path: impl Into<String>, id: impl Into<String>) -> Self {
        DocKey(CollectionPath::new(path), DocId::new(id))
    }

    pub fn path(&self) -> &CollectionPath {
        &self.0
    }

    pub fn id(&self) -> &DocId {
        &self.1
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, self.1)
    }
}

/// A document: its field map plus the `id` and `path` that locate it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub path: CollectionPath,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Document {
    pub fn new(path: CollectionPath, id: DocId, mut fields: Fields) -> Self {
        // Identity lives on the struct, not in the field map.
        fields.remove("id");
        fields.remove("path");
        Document { id, path, fields }
    }

    /// Empty document, used when an override lands on a doc that was never confirmed
    pub fn empty(path: CollectionPath, id: DocId) -> Self {
        Document {
            id,
            path,
            fields: Fields::new(),
        }
    }

    pub fn key(&self) -> DocKey {
        DocKey(self.path.clone(), self.id.clone())
    }

    /// Look up a possibly dotted field path
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        lookup(&self.fields, field)
    }

    /// Shallow-merge `patch` onto this document's fields
    pub fn merge(&mut self, patch: &Fields) {
        for (name, value) in patch {
            if name == "id" || name == "path" {
                continue;
            }
            self.fields.insert(name.clone(), value.clone());
        }
    }

    /// JSON object with `id` and `path` alongside the fields
    pub fn to_value(&self) -> serde_json::Value {
        let mut map = self.fields.clone();
        map.insert("id".into(), serde_json::Value::String(self.id.0.clone()));
        map.insert("path".into(), serde_json::Value::String(self.path.0.clone()));
        serde_json::Value::Object(map)
    }
}
