//! Engine error types

/// Input errors rejected by the engine before any state is touched
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Collection or collection group is required to build a query")]
    MissingCollection,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Queries are not supported inside a transaction (read `{key}`)")]
    QueryInTransaction { key: String },

    #[error("Invalid write: {0}")]
    InvalidWrite(String),

    #[error("Unknown field operation `{op}` on field `{field}`")]
    UnknownFieldOperation { op: String, field: String },

    #[error("Invalid event `{kind}`: {message}")]
    InvalidEvent { kind: String, message: String },

    #[error("Failed to decode: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
