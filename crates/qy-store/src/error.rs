//! Error types for qy-store

use thiserror::Error;

/// State store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O failure on the backing file (ST001)
    #[error("[ST001] state store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure (ST002)
    #[error("[ST002] state store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record lookup failure (ST003)
    #[error("[ST003] {what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// Interior lock poisoned by a panicking writer
    #[error("state store lock poisoned")]
    Poisoned,
}

/// Result type alias for StoreError
pub type StoreResult<T> = Result<T, StoreError>;
