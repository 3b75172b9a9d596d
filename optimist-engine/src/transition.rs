//! Event handlers
//!
//! Each handler validates and decodes its event completely before touching
//! the stores, so a rejected event leaves the state as it was. Handlers
//! return the paths they changed; reprocessing is the caller's job.

use crate::atomize::{atomize, expand_dotted, implicated};
use crate::cache::CachedQuery;
use crate::config::EngineConfig;
use crate::descriptor::{QueryDescriptor, Target};
use crate::engine::State;
use crate::error::Result;
use crate::event::{Event, EventKind, OrderedPayload, OrderedRef};
use crate::reprocess::ChangeSet;
use crate::pipeline::order::compare;
use crate::store::{DocumentStore, Override};
use chrono::{DateTime, Utc};
use optimist_types::{values_equal, CollectionPath, DocId, DocKey, Document, Fields};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Apply one event; `None` means the event type is not handled
pub(crate) fn apply(
    state: &mut State,
    event: &Event,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<Option<ChangeSet>> {
    let changes = match event.kind {
        EventKind::ListenerResponse | EventKind::GetSuccess => initialize(state, event)?,
        EventKind::UnsetListener => conclude(state, event, config)?,
        EventKind::DocumentAdded | EventKind::DocumentModified => modify(state, event)?,
        EventKind::DocumentRemoved | EventKind::DeleteSuccess => deletion(state, event)?,
        EventKind::OptimisticAdded | EventKind::OptimisticModified => optimistic(state, event)?,
        EventKind::OptimisticRemoved => reset(state, event)?,
        EventKind::MutateStart => mutation(state, event, now)?,
        EventKind::AddFailure
        | EventKind::SetFailure
        | EventKind::UpdateFailure
        | EventKind::DeleteFailure
        | EventKind::MutateFailure => failure(state, event)?,
        EventKind::Unknown => {
            debug!("ignoring event of unknown type");
            return Ok(None);
        }
    };
    Ok(Some(changes))
}

fn target_path(descriptor: &QueryDescriptor) -> Option<CollectionPath> {
    match descriptor.target() {
        Target::Collection(path) => Some(path),
        Target::Group(_) => None,
    }
}

/// Resolve one entry of a reported order to a document key
fn placed_key(
    event: &Event,
    entry: &OrderedRef,
    descriptor: &QueryDescriptor,
    docs: &[Document],
) -> Result<DocKey> {
    match entry {
        OrderedRef::Key(key) => Ok(key.clone()),
        OrderedRef::Id(id) => docs
            .iter()
            .find(|doc| doc.id.as_str() == id)
            .map(Document::key)
            .or_else(|| target_path(descriptor).map(|path| DocKey(path, DocId::new(id.as_str()))))
            .ok_or_else(|| event.invalid(format!("cannot place `{id}` without a collection path"))),
    }
}

/// `listener-response` / `get-success`
fn initialize(state: &mut State, event: &Event) -> Result<ChangeSet> {
    let descriptor = event.descriptor()?;
    let docs = event.documents(&descriptor)?;
    let confirmed = match &event.payload.ordered {
        Some(OrderedPayload::Keys(entries)) => entries
            .iter()
            .map(|entry| placed_key(event, entry, &descriptor, &docs))
            .collect::<Result<Vec<_>>>()?,
        _ => docs.iter().map(Document::key).collect(),
    };

    let key = descriptor.key();
    let mut changes = ChangeSet::new();
    if let Some(path) = target_path(&descriptor) {
        changes.touch(path);
    }
    debug!(key = %key, documents = docs.len(), "initialized query");

    for doc in docs {
        changes.touch(doc.path.clone());
        state.database.set(doc.path.clone(), doc.id.clone(), doc);
    }
    state.cache.insert(key.clone(), CachedQuery::new(descriptor, confirmed));
    changes.touch_query(key);
    Ok(changes)
}

/// `unset-listener`: drop the query and evict documents nothing else uses
fn conclude(state: &mut State, event: &Event, config: &EngineConfig) -> Result<ChangeSet> {
    let descriptor = event.descriptor()?;
    let key = descriptor.key();
    let mut changes = ChangeSet::new();

    let Some(removed) = state.cache.remove(&key) else {
        debug!(key = %key, "unset for a query that is not cached");
        return Ok(changes);
    };
    if let Some(path) = target_path(&descriptor) {
        changes.touch(path);
    }
    if event.preserve || config.preserve_on_unset {
        debug!(key = %key, "unset listener, documents preserved");
        return Ok(changes);
    }

    let evicted: BTreeSet<DocKey> = removed
        .ordered
        .iter()
        .chain(&removed.confirmed)
        .filter(|doc| !state.cache.values().any(|query| query.references(doc)))
        .cloned()
        .collect();

    for doc in &evicted {
        if state.database.unset(doc.path(), doc.id()).is_some() {
            changes.touch(doc.path().clone());
        }
    }
    debug!(key = %key, evicted = evicted.len(), "unset listener");
    Ok(changes)
}

/// Whether a confirmed document shows every field of a pending patch
fn confirms(patch: &Fields, doc: &Document) -> bool {
    patch.iter().all(|(name, value)| {
        doc.fields
            .get(name)
            .is_some_and(|confirmed| values_equal(confirmed, value))
    })
}

/// `document-added` / `document-modified`
fn modify(state: &mut State, event: &Event) -> Result<ChangeSet> {
    let descriptor = event.descriptor_opt()?;
    let doc = event.single_document(descriptor.as_ref())?;
    let key = doc.key();

    let stored = match state.database.get(&doc.path, &doc.id) {
        Some(existing) if event.merge => {
            let mut merged = existing.clone();
            merged.merge(&doc.fields);
            merged
        }
        _ => doc,
    };

    let pending = state.overrides.get(key.path(), key.id()).and_then(Override::as_patch);
    if let Some(patch) = pending {
        if confirms(patch, &stored) {
            debug!(doc = %key, "override confirmed");
            state.overrides.unset(key.path(), key.id());
        }
    }
    state.database.set(key.path().clone(), key.id().clone(), stored);

    let named = descriptor
        .as_ref()
        .and_then(|descriptor| state.cache.get_mut(&descriptor.key()));
    if let Some(query) = named {
        match &event.payload.ordered {
            Some(OrderedPayload::Change { new_index, .. }) => match usize::try_from(*new_index) {
                Ok(index) => query.place(key.clone(), index),
                Err(_) => query.forget(&key),
            },
            _ if !query.confirmed.contains(&key) => {
                let index = sorted_position(query, &state.database, &key);
                query.place(key.clone(), index);
            }
            _ => {}
        }
    }

    let mut changes = ChangeSet::new();
    changes.touch(key.0);
    Ok(changes)
}

/// Where a newly reported document falls in a query's confirmed order
///
/// Sorted in by `orderBy`; appended when the query has no order.
fn sorted_position(query: &CachedQuery, database: &DocumentStore, key: &DocKey) -> usize {
    let order_by = &query.descriptor.order_by;
    let doc = match database.get(key.path(), key.id()) {
        Some(doc) if !order_by.is_empty() => doc,
        _ => return query.confirmed.len(),
    };
    query
        .confirmed
        .iter()
        .take_while(|placed| {
            database
                .get(placed.path(), placed.id())
                .map_or(true, |other| compare(other, doc, order_by) != Ordering::Greater)
        })
        .count()
}

/// `document-removed` / `delete-success`
fn deletion(state: &mut State, event: &Event) -> Result<ChangeSet> {
    let descriptor = event.descriptor_opt()?;
    let key = event.document_key(descriptor.as_ref())?;

    state.overrides.unset(key.path(), key.id());
    if let Some(query) = descriptor
        .as_ref()
        .and_then(|descriptor| state.cache.get_mut(&descriptor.key()))
    {
        query.forget(&key);
    }

    let evict = match event.kind {
        EventKind::DeleteSuccess => true,
        _ => !state.cache.values().any(|query| query.confirmed.contains(&key)),
    };
    if evict {
        state.database.unset(key.path(), key.id());
    }
    debug!(doc = %key, evicted = evict, "document removed");

    let mut changes = ChangeSet::new();
    changes.touch(key.0);
    Ok(changes)
}

/// `optimistic-added` / `optimistic-modified`
fn optimistic(state: &mut State, event: &Event) -> Result<ChangeSet> {
    let descriptor = event.descriptor_opt()?;
    let doc = event.single_document(descriptor.as_ref())?;
    let patch = expand_dotted(doc.fields);

    state
        .overrides
        .merge(doc.path.clone(), doc.id, Override::Patch(patch));

    let mut changes = ChangeSet::new();
    changes.touch(doc.path);
    Ok(changes)
}

/// `optimistic-removed`: drop a pending write
fn reset(state: &mut State, event: &Event) -> Result<ChangeSet> {
    let descriptor = event.descriptor_opt()?;
    let key = event.document_key(descriptor.as_ref())?;

    state.overrides.unset(key.path(), key.id());

    let mut changes = ChangeSet::new();
    changes.touch(key.0);
    Ok(changes)
}

/// `mutate-start`: atomize the request into the override store
fn mutation(state: &mut State, event: &Event, now: DateTime<Utc>) -> Result<ChangeSet> {
    let Some(args) = &event.payload.args else {
        return Err(event.invalid("missing args"));
    };
    let entries = atomize(&state.database, &state.overrides, args, now)?;

    let mut changes = ChangeSet::new();
    debug!(writes = entries.len(), "applying optimistic mutation");
    for entry in entries {
        changes.touch(entry.path.clone());
        state.overrides.merge(entry.path, entry.id, entry.entry);
    }
    Ok(changes)
}

/// `*-failure`: roll back every write of the failed request
fn failure(state: &mut State, event: &Event) -> Result<ChangeSet> {
    let targets: BTreeSet<(CollectionPath, DocId)> = match &event.payload.args {
        Some(args) => implicated(&state.database, args)?,
        None => {
            let descriptor = event.descriptor_opt()?;
            let key = event.document_key(descriptor.as_ref())?;
            BTreeSet::from([(key.0, key.1)])
        }
    };

    let mut changes = ChangeSet::new();
    let mut rolled_back = 0;
    for (path, id) in targets {
        if state.overrides.unset(&path, &id).is_some() {
            rolled_back += 1;
        }
        changes.touch(path);
    }
    warn!(kind = %event.kind, rolled_back, "write failed, rolled back optimistic state");
    Ok(changes)
}
