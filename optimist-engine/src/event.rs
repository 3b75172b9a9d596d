//! Inbound events
//!
//! Events arrive as `{type, meta, payload: {data, ordered, args}, preserve,
//! merge}`. `meta` names the query or document the event is about. Types
//! the engine does not know deserialize to [`EventKind::Unknown`].

use crate::descriptor::{QueryDescriptor, QuerySpec, Target};
use crate::error::{EngineError, Result};
use crate::write::WriteRequest;
use optimist_types::{CollectionPath, DocId, DocKey, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ListenerResponse,
    GetSuccess,
    UnsetListener,
    DocumentAdded,
    DocumentModified,
    DocumentRemoved,
    DeleteSuccess,
    OptimisticAdded,
    OptimisticModified,
    OptimisticRemoved,
    MutateStart,
    AddFailure,
    SetFailure,
    UpdateFailure,
    DeleteFailure,
    MutateFailure,
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ListenerResponse => "listener-response",
            EventKind::GetSuccess => "get-success",
            EventKind::UnsetListener => "unset-listener",
            EventKind::DocumentAdded => "document-added",
            EventKind::DocumentModified => "document-modified",
            EventKind::DocumentRemoved => "document-removed",
            EventKind::DeleteSuccess => "delete-success",
            EventKind::OptimisticAdded => "optimistic-added",
            EventKind::OptimisticModified => "optimistic-modified",
            EventKind::OptimisticRemoved => "optimistic-removed",
            EventKind::MutateStart => "mutate-start",
            EventKind::AddFailure => "add-failure",
            EventKind::SetFailure => "set-failure",
            EventKind::UpdateFailure => "update-failure",
            EventKind::DeleteFailure => "delete-failure",
            EventKind::MutateFailure => "mutate-failure",
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of a remote-reported order: a bare id or a `[path, id]` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderedRef {
    Key(DocKey),
    Id(String),
}

/// `payload.ordered`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderedPayload {
    /// Full order of a listener response
    Keys(Vec<OrderedRef>),
    /// Position change of one document; negative indexes mean absent
    #[serde(rename_all = "camelCase")]
    Change {
        new_index: i64,
        #[serde(default)]
        old_index: Option<i64>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered: Option<OrderedPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<WriteRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<QuerySpec>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preserve: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub merge: bool,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Event {
            kind,
            meta: None,
            payload: Payload::default(),
            preserve: false,
            merge: false,
        }
    }

    pub fn with_meta(mut self, meta: impl Into<QuerySpec>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.payload.data = Some(data);
        self
    }

    pub fn with_ordered(mut self, ordered: OrderedPayload) -> Self {
        self.payload.ordered = Some(ordered);
        self
    }

    pub fn with_args(mut self, args: impl Into<WriteRequest>) -> Self {
        self.payload.args = Some(args.into());
        self
    }

    /// Decode one JSON event
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) fn invalid(&self, message: impl Into<String>) -> EngineError {
        EngineError::InvalidEvent {
            kind: self.kind.to_string(),
            message: message.into(),
        }
    }

    /// Normalized `meta`, required by every handler that names a query
    pub(crate) fn descriptor(&self) -> Result<QueryDescriptor> {
        match &self.meta {
            Some(meta) => QueryDescriptor::normalize(meta.clone()),
            None => Err(self.invalid("missing meta")),
        }
    }

    /// Normalized `meta` if present
    pub(crate) fn descriptor_opt(&self) -> Result<Option<QueryDescriptor>> {
        self.meta
            .clone()
            .map(QueryDescriptor::normalize)
            .transpose()
    }

    /// Build a document from an object, taking identity from the object
    /// itself or falling back to `id` and the query's target path
    fn document(
        &self,
        value: &Value,
        id: Option<&str>,
        descriptor: Option<&QueryDescriptor>,
    ) -> Result<Document> {
        let Value::Object(fields) = value else {
            return Err(self.invalid("document data must be an object"));
        };
        let id = match id.or_else(|| fields.get("id").and_then(Value::as_str)) {
            Some(id) if !id.is_empty() => id,
            _ => return Err(self.invalid("document has no id")),
        };
        let path = fields
            .get("path")
            .and_then(Value::as_str)
            .map(CollectionPath::new)
            .or_else(|| match descriptor.map(QueryDescriptor::target) {
                Some(Target::Collection(path)) => Some(path),
                _ => None,
            })
            .ok_or_else(|| self.invalid(format!("document `{id}` has no collection path")))?;

        Ok(Document::new(path, DocId::new(id), fields.clone()))
    }

    /// Documents of a listener response or get
    ///
    /// `data` is a list of documents, an `{id: fields}` map, or a single
    /// document when `meta` names one. A null entry is a missing document.
    pub(crate) fn documents(&self, descriptor: &QueryDescriptor) -> Result<Vec<Document>> {
        let target_doc = descriptor.target_doc();
        match &self.payload.data {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| self.document(item, None, Some(descriptor)))
                .collect(),
            Some(item @ Value::Object(_)) if target_doc.is_some() => {
                let id = target_doc.as_ref().map(DocId::as_str);
                Ok(vec![self.document(item, id, Some(descriptor))?])
            }
            Some(Value::Object(map)) => map
                .iter()
                .filter(|(_, item)| !item.is_null())
                .map(|(id, item)| self.document(item, Some(id), Some(descriptor)))
                .collect(),
            Some(_) => Err(self.invalid("data must be a list, a map or a document")),
        }
    }

    /// The single document carried by `data`
    pub(crate) fn single_document(&self, descriptor: Option<&QueryDescriptor>) -> Result<Document> {
        let Some(data) = &self.payload.data else {
            return Err(self.invalid("missing data"));
        };
        let target_doc = descriptor.and_then(QueryDescriptor::target_doc);
        let explicit = data.get("id").and_then(Value::as_str);
        self.document(data, explicit.or(target_doc.as_ref().map(DocId::as_str)), descriptor)
    }

    /// Key of the document an event is about: `data.id`/`data.path` when
    /// present, else the document named by `meta`
    pub(crate) fn document_key(&self, descriptor: Option<&QueryDescriptor>) -> Result<DocKey> {
        let data = self.payload.data.as_ref();
        let id = data
            .and_then(|data| data.get("id"))
            .and_then(Value::as_str)
            .map(DocId::new)
            .or_else(|| descriptor.and_then(QueryDescriptor::target_doc))
            .ok_or_else(|| self.invalid("no document id in data or meta"))?;
        let path = data
            .and_then(|data| data.get("path"))
            .and_then(Value::as_str)
            .map(CollectionPath::new)
            .or_else(|| match descriptor.map(QueryDescriptor::target) {
                Some(Target::Collection(path)) => Some(path),
                _ => None,
            })
            .ok_or_else(|| self.invalid(format!("no collection path for `{id}`")))?;
        Ok(DocKey(path, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_type() {
        let event = Event::from_json(r#"{"type": "something-else"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
    }

    #[test]
    fn test_kind_names_round_trip() {
        let kind: EventKind = serde_json::from_value(json!("mutate-failure")).unwrap();
        assert_eq!(kind, EventKind::MutateFailure);
        assert_eq!(kind.to_string(), "mutate-failure");
    }

    #[test]
    fn test_ordered_shapes() {
        let keys: OrderedPayload = serde_json::from_value(json!(["a", ["c", "b"]])).unwrap();
        assert_eq!(
            keys,
            OrderedPayload::Keys(vec![
                OrderedRef::Id("a".into()),
                OrderedRef::Key(DocKey::new("c", "b")),
            ])
        );

        let change: OrderedPayload =
            serde_json::from_value(json!({"newIndex": 2, "oldIndex": -1})).unwrap();
        assert_eq!(
            change,
            OrderedPayload::Change {
                new_index: 2,
                old_index: Some(-1)
            }
        );
    }

    #[test]
    fn test_documents_from_list_and_map() {
        let descriptor = QueryDescriptor::collection("users");
        let list = Event::new(EventKind::ListenerResponse)
            .with_data(json!([{"id": "a", "n": 1}, {"id": "b", "n": 2}]));
        let docs = list.documents(&descriptor).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].key(), DocKey::new("users", "b"));

        let map = Event::new(EventKind::ListenerResponse)
            .with_data(json!({"a": {"n": 1}, "gone": null}));
        let docs = map.documents(&descriptor).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("n"), Some(&json!(1)));
    }

    #[test]
    fn test_documents_for_single_doc_query() {
        let descriptor = QueryDescriptor::parse("users/a").unwrap();
        let event = Event::new(EventKind::GetSuccess).with_data(json!({"n": 1}));
        let docs = event.documents(&descriptor).unwrap();
        assert_eq!(docs[0].key(), DocKey::new("users", "a"));
    }

    #[test]
    fn test_group_documents_need_paths() {
        let descriptor = QueryDescriptor {
            collection_group: Some("posts".into()),
            ..Default::default()
        };
        let event = Event::new(EventKind::ListenerResponse).with_data(json!([{"id": "p1"}]));
        assert!(matches!(
            event.documents(&descriptor),
            Err(EngineError::InvalidEvent { .. })
        ));

        let event = Event::new(EventKind::ListenerResponse)
            .with_data(json!([{"id": "p1", "path": "users/a/posts"}]));
        assert_eq!(
            event.documents(&descriptor).unwrap()[0].key(),
            DocKey::new("users/a/posts", "p1")
        );
    }

    #[test]
    fn test_document_key_from_meta() {
        let event = Event::new(EventKind::OptimisticRemoved).with_meta("users/a");
        let descriptor = event.descriptor().unwrap();
        assert_eq!(
            event.document_key(Some(&descriptor)).unwrap(),
            DocKey::new("users", "a")
        );
    }

    #[test]
    fn test_missing_meta_is_invalid() {
        let event = Event::new(EventKind::UnsetListener);
        assert!(matches!(
            event.descriptor(),
            Err(EngineError::InvalidEvent { .. })
        ));
    }
}
