//! Populate joins

use super::{lift_collection, Working};
use crate::descriptor::Populate;
use crate::store::{DocumentStore, OverrideStore};
use optimist_types::{CollectionPath, DocId, DocKey, Document};
use serde_json::Value;
use std::borrow::Cow;

/// Foreign collections for a query's populates, overlaid once per recompute
#[derive(Debug)]
pub struct Joins<'a> {
    tables: Vec<(&'a Populate, CollectionPath, Working<'a>)>,
    optimistic: bool,
}

impl<'a> Joins<'a> {
    pub fn prepare(
        populates: &'a [Populate],
        database: &'a DocumentStore,
        overrides: &'a OverrideStore,
    ) -> Self {
        let mut optimistic = false;
        let tables = populates
            .iter()
            .map(|populate| {
                let path = CollectionPath::new(populate.collection.clone());
                let (table, overlaid) = lift_collection(&path, database, overrides, None);
                optimistic |= overlaid;
                (populate, path, table)
            })
            .collect();
        Joins { tables, optimistic }
    }

    /// Whether any joined collection has pending overrides
    pub fn optimistic(&self) -> bool {
        self.optimistic
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn find(&self, table: &Working<'a>, path: &CollectionPath, id: &Value) -> Option<Value> {
        let id = id.as_str()?;
        let key = DocKey(path.clone(), DocId::new(id));
        table.get(&key).map(|doc| doc.to_value())
    }

    /// Attach joined documents onto `doc`
    ///
    /// The local field holds an id or a list of ids. Ids with no matching
    /// document are left out.
    pub fn attach(&self, doc: &mut Cow<'a, Document>) {
        for (populate, path, table) in &self.tables {
            let joined = match doc.get(&populate.field) {
                Some(Value::Array(ids)) => Value::Array(
                    ids.iter()
                        .filter_map(|id| self.find(table, path, id))
                        .collect(),
                ),
                Some(id) => match self.find(table, path, id) {
                    Some(found) => found,
                    None => continue,
                },
                None => continue,
            };
            doc.to_mut()
                .fields
                .insert(populate.result_field().to_string(), joined);
        }
    }
}
