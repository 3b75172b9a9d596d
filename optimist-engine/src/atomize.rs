//! Mutation atomization
//!
//! Turns a [`WriteRequest`] into concrete override entries. Dotted keys are
//! expanded into nested objects and relative field operations
//! (`["::increment", 1]` and friends) are resolved against the value the
//! document currently shows: pending override first, then confirmed state,
//! then a type default.
//!
//! Atomization only reads the stores. The wall-clock instant used for
//! `::serverTimestamp` is passed in by the caller.

use crate::descriptor::QueryDescriptor;
use crate::error::{EngineError, Result};
use crate::store::{DocumentStore, Override, OverrideStore};
use crate::write::{ResolvedReads, Transaction, TransactionWrite, Write, WriteRequest};
use chrono::{DateTime, Utc};
use optimist_types::{lookup, values_equal, CollectionPath, DocId, Fields};
use serde_json::{json, Number, Value};
use std::collections::BTreeSet;

const OP_PREFIX: &str = "::";

/// One override entry produced by a write
#[derive(Debug, Clone, PartialEq)]
pub struct AtomizedWrite {
    pub path: CollectionPath,
    pub id: DocId,
    pub entry: Override,
}

/// Resolves write requests against a snapshot of both stores
#[derive(Debug)]
pub struct Atomizer<'a> {
    database: &'a DocumentStore,
    overrides: &'a OverrideStore,
    now: DateTime<Utc>,
    /// Entries already emitted for this request
    scratch: OverrideStore,
}

impl<'a> Atomizer<'a> {
    pub fn new(database: &'a DocumentStore, overrides: &'a OverrideStore, now: DateTime<Utc>) -> Self {
        Atomizer {
            database,
            overrides,
            now,
            scratch: OverrideStore::new(),
        }
    }

    /// Atomize every write of the request, in order
    pub fn atomize(mut self, request: &WriteRequest) -> Result<Vec<AtomizedWrite>> {
        let writes = resolve_writes(self.database, request)?;
        let mut atomized = Vec::with_capacity(writes.len());

        for write in &writes {
            let (path, id) = write.target()?;
            let entry = if write.delete {
                Override::Removed
            } else {
                let data = match &write.data {
                    Some(Value::Object(data)) => data.clone(),
                    Some(other) => {
                        return Err(EngineError::InvalidWrite(format!(
                            "data for `{path}/{id}` must be an object, got {other}"
                        )))
                    }
                    None => {
                        return Err(EngineError::InvalidWrite(format!(
                            "write to `{path}/{id}` has no data"
                        )))
                    }
                };
                let expanded = expand_dotted(data);
                Override::Patch(self.resolve_fields(&path, &id, "", expanded)?)
            };

            self.scratch.merge(path.clone(), id.clone(), entry.clone());
            atomized.push(AtomizedWrite { path, id, entry });
        }

        Ok(atomized)
    }

    fn resolve_fields(
        &self,
        path: &CollectionPath,
        id: &DocId,
        prefix: &str,
        fields: Fields,
    ) -> Result<Fields> {
        let mut resolved = Fields::new();
        for (name, value) in fields {
            let field = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            let value = match value {
                Value::Object(nested) => Value::Object(self.resolve_fields(path, id, &field, nested)?),
                Value::Array(items) => match items.first() {
                    Some(Value::String(tag)) if tag.starts_with(OP_PREFIX) => {
                        self.apply_op(path, id, &field, tag, &items[1..])?
                    }
                    _ => Value::Array(items),
                },
                other => other,
            };
            resolved.insert(name, value);
        }
        Ok(resolved)
    }

    fn apply_op(
        &self,
        path: &CollectionPath,
        id: &DocId,
        field: &str,
        op: &str,
        args: &[Value],
    ) -> Result<Value> {
        match op {
            "::arrayUnion" => {
                let mut items = self.current_array(path, id, field);
                items.extend(args.iter().cloned());
                Ok(Value::Array(items))
            }
            "::arrayRemove" => {
                let mut items = self.current_array(path, id, field);
                items.retain(|item| !args.iter().any(|arg| values_equal(item, arg)));
                Ok(Value::Array(items))
            }
            "::increment" => {
                let step = match args.first() {
                    Some(Value::Number(step)) => step,
                    _ => {
                        return Err(EngineError::InvalidWrite(format!(
                            "`::increment` on `{field}` needs a numeric step"
                        )))
                    }
                };
                let current = match self.current_value(path, id, field) {
                    Some(Value::Number(current)) => current,
                    _ => Number::from(0),
                };
                add_numbers(&current, step).map(Value::Number).ok_or_else(|| {
                    EngineError::InvalidWrite(format!("`::increment` on `{field}` overflowed"))
                })
            }
            "::serverTimestamp" => Ok(json!({
                "seconds": self.now.timestamp(),
                "nanoseconds": self.now.timestamp_subsec_nanos(),
            })),
            other => Err(EngineError::UnknownFieldOperation {
                op: other.to_string(),
                field: field.to_string(),
            }),
        }
    }

    fn current_array(&self, path: &CollectionPath, id: &DocId, field: &str) -> Vec<Value> {
        match self.current_value(path, id, field) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    /// Value the document shows for `field` once pending writes are applied
    fn current_value(&self, path: &CollectionPath, id: &DocId, field: &str) -> Option<Value> {
        let top = field.split('.').next().unwrap_or(field);
        for store in [&self.scratch, self.overrides] {
            match store.get(path, id) {
                // Patches shallow-merge, so a patch owning the top-level key hides confirmed state.
                Some(Override::Patch(patch)) if patch.contains_key(field) || patch.contains_key(top) => {
                    return lookup(patch, field).cloned();
                }
                Some(Override::Removed) => return None,
                _ => {}
            }
        }
        self.database.get(path, id)?.get(field).cloned()
    }
}

/// Atomize a request against the current stores
pub fn atomize(
    database: &DocumentStore,
    overrides: &OverrideStore,
    request: &WriteRequest,
    now: DateTime<Utc>,
) -> Result<Vec<AtomizedWrite>> {
    Atomizer::new(database, overrides, now).atomize(request)
}

/// Documents a request writes to, without resolving its data
pub fn implicated(database: &DocumentStore, request: &WriteRequest) -> Result<BTreeSet<(CollectionPath, DocId)>> {
    resolve_writes(database, request)?
        .iter()
        .map(Write::target)
        .collect()
}

/// Flatten a request into its concrete writes
fn resolve_writes(database: &DocumentStore, request: &WriteRequest) -> Result<Vec<Write>> {
    match request {
        WriteRequest::Single(write) => Ok(vec![write.clone()]),
        WriteRequest::Batch(writes) => Ok(writes.clone()),
        WriteRequest::Transaction(transaction) => {
            let reads = resolve_reads(database, transaction)?;
            let mut writes = Vec::new();
            for write in &transaction.writes {
                match write {
                    TransactionWrite::One(write) => writes.push(write.clone()),
                    TransactionWrite::Many(many) => writes.extend(many.iter().cloned()),
                    TransactionWrite::Deferred(f) => writes.extend(f.call(&reads)),
                }
            }
            Ok(writes)
        }
    }
}

fn resolve_reads(database: &DocumentStore, transaction: &Transaction) -> Result<ResolvedReads> {
    let mut reads = ResolvedReads::new();
    for (key, spec) in &transaction.reads {
        let descriptor = QueryDescriptor::normalize(spec.clone())?;
        let target = match (descriptor.target(), descriptor.target_doc()) {
            (crate::descriptor::Target::Collection(path), Some(id))
                if descriptor.filters.is_empty() =>
            {
                (path, id)
            }
            _ => return Err(EngineError::QueryInTransaction { key: key.clone() }),
        };
        reads.insert(key.clone(), database.get(&target.0, &target.1).cloned());
    }
    Ok(reads)
}

fn add_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Some(Number::from(sum));
        }
    }
    Number::from_f64(a.as_f64()? + b.as_f64()?)
}

/// Expand dotted keys into nested objects, recursively
///
/// `{"a.b": 1, "a.c": 2}` becomes `{"a": {"b": 1, "c": 2}}`.
pub fn expand_dotted(fields: Fields) -> Fields {
    let mut expanded = Fields::new();
    for (key, value) in fields {
        let value = match value {
            Value::Object(nested) => Value::Object(expand_dotted(nested)),
            other => other,
        };
        let segments: Vec<&str> = key.split('.').collect();
        insert_at(&mut expanded, &segments, value);
    }
    expanded
}

fn insert_at(target: &mut Fields, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        if let Value::Object(incoming) = &value {
            if let Some(Value::Object(existing)) = target.get_mut(*head) {
                for (name, value) in incoming {
                    insert_at(existing, &[name.as_str()], value.clone());
                }
                return;
            }
        }
        target.insert(head.to_string(), value);
        return;
    }

    let slot = target
        .entry(head.to_string())
        .or_insert_with(|| Value::Object(Fields::new()));
    if !slot.is_object() {
        *slot = Value::Object(Fields::new());
    }
    if let Value::Object(nested) = slot {
        insert_at(nested, rest, value);
    }
}
