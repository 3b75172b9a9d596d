//! Optimistic cache and query reconciliation engine
//!
//! This crate keeps an in-memory mirror of a remote document database and
//! answers queries synchronously against a mix of confirmed documents and
//! local writes the server has not acknowledged yet.
//!
//! # Architecture
//!
//! ```text
//! event → transition table → stores → reprocessing → cached queries
//! ```
//!
//! - The **document store** holds confirmed documents, the **override
//!   store** holds pending writes layered over them.
//! - The **atomizer** turns write requests (single, batch, transaction)
//!   into override entries, resolving `::increment` and friends.
//! - The **pipeline** derives a query result from both stores:
//!   join, lift, overlay, filter, sort, paginate, project.
//! - **Reprocessing** recomputes every cached query that depends on a
//!   collection an event touched.
//!
//! Cached results are always derivable: a fresh pipeline run over the
//! current stores yields the same ordering.
//!
//! # Example
//!
//! ```rust
//! use optimist_engine::prelude::*;
//! use serde_json::json;
//!
//! let mut engine = Engine::new();
//! engine
//!     .dispatch(
//!         &Event::new(EventKind::ListenerResponse)
//!             .with_meta("todos")
//!             .with_data(json!([{"id": "t1", "done": false}])),
//!     )
//!     .unwrap();
//!
//! engine
//!     .dispatch(
//!         &Event::new(EventKind::MutateStart)
//!             .with_args(Write::new("todos", "t1", json!({"done": true}))),
//!     )
//!     .unwrap();
//!
//! let todos = engine.query("todos").unwrap();
//! assert_eq!(todos.via, Via::Optimistic);
//! ```

#![warn(missing_debug_implementations)]

pub mod atomize;
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod event;
pub mod listeners;
pub mod metrics;
pub mod pipeline;
pub mod reprocess;
pub mod shared;
pub mod store;
mod transition;
pub mod write;

pub use atomize::{atomize, expand_dotted, implicated, AtomizedWrite, Atomizer};
pub use cache::{CachedQuery, QuerySnapshot, Revision, Snapshot};
pub use config::{ConfigError, EngineConfig};
pub use descriptor::{
    Direction, Operator, OrderBy, Populate, QueryDescriptor, QuerySpec, Subcollection, Target,
    WhereClause,
};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use event::{Event, EventKind, OrderedPayload, OrderedRef, Payload};
pub use listeners::ListenerCounts;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use pipeline::{Pipeline, PipelineOutput, Via};
pub use reprocess::{ChangeSet, Reprocessor};
pub use shared::SharedEngine;
pub use store::{DocumentStore, Override, OverrideStore, Store};
pub use write::{ResolvedReads, Transaction, TransactionWrite, Write, WriteRequest};

pub use optimist_types::{CollectionPath, DocId, DocKey, Document, Fields};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::descriptor::{Operator, OrderBy, QueryDescriptor, QuerySpec, WhereClause};
    pub use crate::engine::Engine;
    pub use crate::event::{Event, EventKind};
    pub use crate::pipeline::Via;
    pub use crate::shared::SharedEngine;
    pub use crate::write::{Transaction, TransactionWrite, Write, WriteRequest};
    pub use optimist_types::{CollectionPath, DocId, DocKey, Document};
}
