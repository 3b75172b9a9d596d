//! Cached query results
//!
//! A [`CachedQuery`] holds a descriptor, the order the remote last
//! reported for it, and the result most recently derived from the stores.
//! The derived fields are only ever replaced wholesale by reprocessing.

use crate::descriptor::QueryDescriptor;
use crate::pipeline::{PipelineOutput, Via};
use optimist_types::DocKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic engine revision, bumped once per handled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    pub descriptor: QueryDescriptor,
    /// Remote-reported order
    pub confirmed: Vec<DocKey>,
    /// Current result
    pub ordered: Vec<DocKey>,
    pub via: Via,
    /// Revision at which `ordered` was computed
    pub revision: Revision,
}

impl CachedQuery {
    /// New entry; `ordered` stays empty until the first reprocess
    pub fn new(descriptor: QueryDescriptor, confirmed: Vec<DocKey>) -> Self {
        CachedQuery {
            descriptor,
            confirmed,
            ordered: Vec::new(),
            via: Via::Cache,
            revision: Revision::ZERO,
        }
    }

    /// Replace the derived fields; returns false if `ordered` is unchanged
    pub fn apply(&mut self, output: PipelineOutput, revision: Revision) -> bool {
        let changed = self.ordered != output.ordered;
        self.ordered = output.ordered;
        self.via = output.via;
        self.revision = revision;
        changed
    }

    /// Whether `key` is in the current result or the confirmed order
    pub fn references(&self, key: &DocKey) -> bool {
        self.ordered.contains(key) || self.confirmed.contains(key)
    }

    /// Move `key` to `index` in the confirmed order, appending past the end
    pub fn place(&mut self, key: DocKey, index: usize) {
        self.confirmed.retain(|existing| existing != &key);
        let index = index.min(self.confirmed.len());
        self.confirmed.insert(index, key);
    }

    /// Drop `key` from the confirmed order
    pub fn forget(&mut self, key: &DocKey) {
        self.confirmed.retain(|existing| existing != key);
    }
}

/// Serializable view of one cached query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySnapshot {
    pub key: String,
    pub via: Via,
    pub revision: Revision,
    pub ordered: Vec<DocKey>,
}

/// Serializable view of the whole engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub revision: Revision,
    pub documents: usize,
    pub overrides: usize,
    pub queries: Vec<QuerySnapshot>,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "revision {} | {} documents | {} overrides",
            self.revision, self.documents, self.overrides
        )?;
        for query in &self.queries {
            let ordered: Vec<String> = query.ordered.iter().map(ToString::to_string).collect();
            writeln!(f, "{} [{}] {}", query.key, query.via, ordered.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> DocKey {
        DocKey::new("c", id)
    }

    #[test]
    fn test_revision_display() {
        assert_eq!(Revision::ZERO.next().next().to_string(), "r2");
    }

    #[test]
    fn test_apply_reports_change() {
        let mut query = CachedQuery::new(QueryDescriptor::collection("c"), vec![]);
        let output = PipelineOutput {
            ordered: vec![key("a")],
            via: Via::Optimistic,
            full_path: true,
        };

        assert!(query.apply(output.clone(), Revision(1)));
        assert!(!query.apply(output, Revision(2)));
        assert_eq!(query.via, Via::Optimistic);
        assert_eq!(query.revision, Revision(2));
    }

    #[test]
    fn test_place_moves_and_clamps() {
        let mut query = CachedQuery::new(
            QueryDescriptor::collection("c"),
            vec![key("a"), key("b"), key("c")],
        );
        query.place(key("c"), 0);
        assert_eq!(query.confirmed, [key("c"), key("a"), key("b")]);

        query.place(key("d"), 99);
        assert_eq!(query.confirmed.last(), Some(&key("d")));

        query.forget(&key("a"));
        assert_eq!(query.confirmed, [key("c"), key("b"), key("d")]);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = Snapshot {
            revision: Revision(3),
            documents: 1,
            overrides: 0,
            queries: vec![QuerySnapshot {
                key: "c".into(),
                via: Via::Cache,
                revision: Revision(3),
                ordered: vec![key("a")],
            }],
        };
        let text = snapshot.to_string();
        assert!(text.contains("revision r3"));
        assert!(text.contains("c [cache] c/a"));
    }
}
