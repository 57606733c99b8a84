//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The store was given neither a single connection nor a pool
    #[error("invalid connection source: {0}")]
    InvalidConnectionSource(String),

    /// Decode encountered an encoding tag outside the supported set
    ///
    /// Signals a version mismatch between the process that wrote a blob and
    /// the process reading it. Fatal; never coerced into a default value.
    #[error("unsupported encoding kind: {0:?}")]
    UnsupportedEncodingKind(String),

    /// A `list` call requested a metadata predicate
    ///
    /// Metadata filtering is rejected up front; silently ignoring the filter
    /// would return incorrect results.
    #[error("metadata filters are not supported")]
    FilterNotSupported,

    /// Connection acquisition or statement execution failed at the datastore
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Structured encode/decode error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored blob parsed as the right kind but its contents are corrupt
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
