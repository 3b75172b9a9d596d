//! Reprocessing scheduler
//!
//! Collects the paths an event touched and recomputes every cached query
//! that depends on them. All affected queries are evaluated against the
//! same store state first and swapped in afterwards, so no reader ever sees
//! half of a reprocess.

use crate::cache::{CachedQuery, Revision};
use crate::metrics::EngineMetrics;
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::store::{DocumentStore, OverrideStore};
use optimist_types::CollectionPath;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::trace;

/// Paths and queries changed by one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<CollectionPath>,
    queries: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a collection as changed
    pub fn touch(&mut self, path: CollectionPath) {
        self.paths.insert(path);
    }

    /// Force a query to recompute whatever its dependencies
    pub fn touch_query(&mut self, key: impl Into<String>) {
        self.queries.insert(key.into());
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.queries.is_empty()
    }

    /// Whether the cached query under `key` has to be recomputed
    pub fn affects(&self, key: &str, query: &CachedQuery) -> bool {
        self.queries.contains(key) || self.paths.iter().any(|path| query.descriptor.depends_on(path))
    }
}

/// Recomputes cached queries against a fixed view of the stores
#[derive(Debug)]
pub struct Reprocessor<'a> {
    database: &'a DocumentStore,
    overrides: &'a OverrideStore,
    metrics: Option<&'a EngineMetrics>,
}

impl<'a> Reprocessor<'a> {
    pub fn new(database: &'a DocumentStore, overrides: &'a OverrideStore) -> Self {
        Reprocessor {
            database,
            overrides,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: &'a EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fresh pipeline run for one cached query
    pub fn evaluate(&self, query: &CachedQuery) -> PipelineOutput {
        Pipeline::new(&query.descriptor, self.database, self.overrides)
            .with_confirmed(&query.confirmed)
            .run()
    }

    /// Recompute every query affected by `changes`; returns how many ran
    pub fn run(
        &self,
        cache: &mut BTreeMap<String, CachedQuery>,
        changes: &ChangeSet,
        revision: Revision,
    ) -> usize {
        if changes.is_empty() {
            return 0;
        }
        let start = Instant::now();

        let outputs: Vec<(String, PipelineOutput)> = cache
            .iter()
            .filter(|(key, query)| changes.affects(key, query))
            .map(|(key, query)| (key.clone(), self.evaluate(query)))
            .collect();

        let count = outputs.len();
        for (key, output) in outputs {
            let Some(query) = cache.get_mut(&key) else {
                continue;
            };
            let full_path = output.full_path;
            let changed = query.apply(output, revision);
            trace!(
                key = %key,
                via = %query.via,
                results = query.ordered.len(),
                full_path,
                changed,
                "recomputed query"
            );
            if let Some(metrics) = self.metrics {
                metrics.record_recompute(full_path, !changed);
            }
        }

        if let Some(metrics) = self.metrics {
            metrics.record_reprocess(start.elapsed());
        }
        count
    }
}
