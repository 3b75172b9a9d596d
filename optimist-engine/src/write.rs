//! Write requests
//!
//! A request is a single write, a batch of independent writes, or a
//! read-then-write transaction whose writes may be closures over the
//! resolved reads.

use crate::descriptor::QuerySpec;
use crate::error::{EngineError, Result};
use optimist_types::{CollectionPath, DocId, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One document write: `{collection|path, doc|id, data}` or a delete
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Write {
    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete: bool,
}

impl Write {
    pub fn new(collection: impl Into<String>, doc: impl Into<String>, data: Value) -> Self {
        Write {
            collection: Some(collection.into()),
            doc: Some(doc.into()),
            data: Some(data),
            delete: false,
        }
    }

    /// Optimistic delete of a document
    pub fn delete(collection: impl Into<String>, doc: impl Into<String>) -> Self {
        Write {
            collection: Some(collection.into()),
            doc: Some(doc.into()),
            data: None,
            delete: true,
        }
    }

    /// Document this write lands on
    pub fn target(&self) -> Result<(CollectionPath, DocId)> {
        let collection = match self.collection.as_deref() {
            Some(collection) if !collection.is_empty() => collection,
            _ => return Err(EngineError::InvalidWrite("write has no collection".into())),
        };
        let doc = match self.doc.as_deref() {
            Some(doc) if !doc.is_empty() => doc,
            _ => {
                return Err(EngineError::InvalidWrite(format!(
                    "write to `{collection}` has no doc id"
                )))
            }
        };
        Ok((CollectionPath::new(collection), DocId::new(doc)))
    }
}

/// Reads resolved for a transaction, by read key
pub type ResolvedReads = BTreeMap<String, Option<Document>>;

/// A transaction write computed from the resolved reads
#[derive(Clone)]
pub struct WriteFn(Arc<dyn Fn(&ResolvedReads) -> Vec<Write> + Send + Sync>);

impl WriteFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ResolvedReads) -> Vec<Write> + Send + Sync + 'static,
    {
        WriteFn(Arc::new(f))
    }

    pub fn call(&self, reads: &ResolvedReads) -> Vec<Write> {
        (self.0)(reads)
    }
}

impl fmt::Debug for WriteFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WriteFn(..)")
    }
}

impl PartialEq for WriteFn {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Entry of a transaction's `writes` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionWrite {
    Many(Vec<Write>),
    One(Write),
    #[serde(skip)]
    Deferred(WriteFn),
}

impl TransactionWrite {
    pub fn deferred<F>(f: F) -> Self
    where
        F: Fn(&ResolvedReads) -> Vec<Write> + Send + Sync + 'static,
    {
        TransactionWrite::Deferred(WriteFn::new(f))
    }
}

/// `{reads: {key -> ref}, writes: [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub reads: BTreeMap<String, QuerySpec>,
    pub writes: Vec<TransactionWrite>,
}

/// Any write request accepted by a mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteRequest {
    Transaction(Transaction),
    Batch(Vec<Write>),
    Single(Write),
}

impl From<Write> for WriteRequest {
    fn from(write: Write) -> Self {
        WriteRequest::Single(write)
    }
}

impl From<Vec<Write>> for WriteRequest {
    fn from(writes: Vec<Write>) -> Self {
        WriteRequest::Batch(writes)
    }
}

impl From<Transaction> for WriteRequest {
    fn from(transaction: Transaction) -> Self {
        WriteRequest::Transaction(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_write_aliases() {
        let request: WriteRequest =
            serde_json::from_value(json!({"path": "users", "id": "alice", "data": {"a": 1}}))
                .unwrap();
        assert_eq!(request, Write::new("users", "alice", json!({"a": 1})).into());
    }

    #[test]
    fn test_batch_shape() {
        let request: WriteRequest = serde_json::from_value(json!([
            {"collection": "users", "doc": "a", "data": {}},
            {"collection": "users", "doc": "b", "delete": true}
        ]))
        .unwrap();
        match request {
            WriteRequest::Batch(writes) => {
                assert_eq!(writes.len(), 2);
                assert!(writes[1].delete);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_transaction_shape() {
        let request: WriteRequest = serde_json::from_value(json!({
            "reads": {"user": {"collection": "users", "doc": "a"}},
            "writes": [{"collection": "users", "doc": "a", "data": {"n": 1}}]
        }))
        .unwrap();
        assert!(matches!(request, WriteRequest::Transaction(_)));
    }

    #[test]
    fn test_target_requires_doc() {
        let write = Write {
            collection: Some("users".into()),
            ..Default::default()
        };
        assert!(matches!(write.target(), Err(EngineError::InvalidWrite(_))));
    }

    #[test]
    fn test_write_fn_equality_is_identity() {
        let f = WriteFn::new(|_| Vec::new());
        let g = WriteFn::new(|_| Vec::new());
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }
}
