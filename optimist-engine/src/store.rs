//! Document and override storage
//!
//! Both stores are `path -> (id -> value)` maps with no validation of their
//! own; the transition table decides what goes in and out. `BTreeMap`s keep
//! iteration deterministic, which the pipeline relies on.

use optimist_types::{CollectionPath, DocId, Document, Fields};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A keyed two-level store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Store<V> {
    entries: BTreeMap<CollectionPath, BTreeMap<DocId, V>>,
}

impl<V> Store<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Store {
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, path: &CollectionPath, id: &DocId) -> Option<&V> {
        self.entries.get(path)?.get(id)
    }

    /// Insert or replace, returning the previous value
    pub fn set(&mut self, path: CollectionPath, id: DocId, value: V) -> Option<V> {
        self.entries.entry(path).or_default().insert(id, value)
    }

    /// Remove an entry; empty collections are dropped with it
    pub fn unset(&mut self, path: &CollectionPath, id: &DocId) -> Option<V> {
        let collection = self.entries.get_mut(path)?;
        let removed = collection.remove(id);
        if collection.is_empty() {
            self.entries.remove(path);
        }
        removed
    }

    pub fn collection(&self, path: &CollectionPath) -> Option<&BTreeMap<DocId, V>> {
        self.entries.get(path)
    }

    /// Whether any entry exists under `path`
    pub fn has_collection(&self, path: &CollectionPath) -> bool {
        self.entries.get(path).is_some_and(|docs| !docs.is_empty())
    }

    pub fn paths(&self) -> impl Iterator<Item = &CollectionPath> {
        self.entries.keys()
    }

    /// Number of entries across all collections
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for Store<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Confirmed documents mirrored from the remote database
pub type DocumentStore = Store<Document>;

/// Pending local writes layered over the document store
pub type OverrideStore = Store<Override>;

/// A pending write for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    /// Fields to shallow-merge over the confirmed document
    Patch(Fields),
    /// The document is optimistically deleted
    Removed,
}

impl Override {
    pub fn as_patch(&self) -> Option<&Fields> {
        match self {
            Override::Patch(fields) => Some(fields),
            Override::Removed => None,
        }
    }
}

impl Store<Override> {
    /// Shallow-merge `next` into the pending entry for a document
    ///
    /// A patch over a patch accumulates fields; anything involving `Removed`
    /// replaces the entry outright.
    pub fn merge(&mut self, path: CollectionPath, id: DocId, next: Override) {
        let collection = self.entries.entry(path).or_default();
        if let Override::Patch(patch) = &next {
            if let Some(Override::Patch(existing)) = collection.get_mut(&id) {
                for (name, value) in patch {
                    existing.insert(name.clone(), value.clone());
                }
                return;
            }
        }
        collection.insert(id, next);
    }
}
