//! The engine: stores, cached queries and the dispatch loop
//!
//! [`Engine::dispatch`] runs one event to completion: the transition table
//! mutates the stores, the revision is bumped, and every cached query that
//! depends on a touched path is recomputed before the call returns.

use crate::cache::{CachedQuery, QuerySnapshot, Revision, Snapshot};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::event::Event;
use crate::metrics::EngineMetrics;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::reprocess::Reprocessor;
use crate::store::{DocumentStore, Override, OverrideStore};
use crate::transition;
use chrono::{DateTime, Utc};
use optimist_types::{CollectionPath, DocId, Document};
use std::collections::BTreeMap;
use tracing::debug;

/// Everything an event handler may change
#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) database: DocumentStore,
    pub(crate) overrides: OverrideStore,
    pub(crate) cache: BTreeMap<String, CachedQuery>,
}

#[derive(Debug, Default)]
pub struct Engine {
    state: State,
    revision: Revision,
    config: EngineConfig,
    metrics: EngineMetrics,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            config,
            ..Self::default()
        }
    }

    /// Handle one event, stamping server timestamps with the current time
    pub fn dispatch(&mut self, event: &Event) -> Result<Revision> {
        self.dispatch_at(event, Utc::now())
    }

    /// Handle one event with an explicit clock instant
    ///
    /// Returns the revision after the event. A rejected event changes
    /// nothing; an unknown event type leaves the revision where it was.
    pub fn dispatch_at(&mut self, event: &Event, now: DateTime<Utc>) -> Result<Revision> {
        if self.config.metrics {
            self.metrics.record_event();
        }

        let changes = match transition::apply(&mut self.state, event, &self.config, now) {
            Ok(Some(changes)) => changes,
            Ok(None) => return Ok(self.revision),
            Err(err) => {
                if self.config.metrics {
                    self.metrics.record_rejected();
                }
                debug!(kind = %event.kind, error = %err, "rejected event");
                return Err(err);
            }
        };

        self.revision = self.revision.next();
        let mut reprocessor = Reprocessor::new(&self.state.database, &self.state.overrides);
        if self.config.metrics {
            reprocessor = reprocessor.with_metrics(&self.metrics);
        }
        let recomputed = reprocessor.run(&mut self.state.cache, &changes, self.revision);
        debug!(
            kind = %event.kind,
            revision = %self.revision,
            recomputed,
            "dispatched event"
        );
        Ok(self.revision)
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Cached query by canonical key
    pub fn query(&self, key: &str) -> Option<&CachedQuery> {
        self.state.cache.get(key)
    }

    /// All cached queries, in key order
    pub fn queries(&self) -> impl Iterator<Item = (&str, &CachedQuery)> {
        self.state
            .cache
            .iter()
            .map(|(key, query)| (key.as_str(), query))
    }

    /// Confirmed document
    pub fn document(&self, path: &CollectionPath, id: &DocId) -> Option<&Document> {
        self.state.database.get(path, id)
    }

    /// Pending override for a document
    pub fn override_entry(&self, path: &CollectionPath, id: &DocId) -> Option<&Override> {
        self.state.overrides.get(path, id)
    }

    pub fn database(&self) -> &DocumentStore {
        &self.state.database
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.state.overrides
    }

    /// Fresh pipeline run for a cached query, bypassing the cache
    pub fn evaluate(&self, key: &str) -> Option<PipelineOutput> {
        let query = self.state.cache.get(key)?;
        Some(
            Reprocessor::new(&self.state.database, &self.state.overrides).evaluate(query),
        )
    }

    /// Materialized result documents of a cached query
    pub fn resolve(&self, key: &str) -> Option<Vec<Document>> {
        let query = self.state.cache.get(key)?;
        Some(
            Pipeline::new(&query.descriptor, &self.state.database, &self.state.overrides)
                .with_confirmed(&query.confirmed)
                .materialize(),
        )
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            documents: self.state.database.len(),
            overrides: self.state.overrides.len(),
            queries: self
                .queries()
                .map(|(key, query)| QuerySnapshot {
                    key: key.to_string(),
                    via: query.via,
                    revision: query.revision,
                    ordered: query.ordered.clone(),
                })
                .collect(),
        }
    }
}
