//! Error types for qy-core

use thiserror::Error;

/// Core error type for Quarry
#[derive(Error, Debug)]
pub enum CoreError {
    /// G001: Edge endpoint is not a registered node
    #[error("[G001] Unknown graph node: {id}")]
    UnknownNode { id: String },

    /// G002: Edge would connect a node to itself
    #[error("[G002] Self-loop rejected for node: {id}")]
    SelfLoop { id: String },

    /// G003: Graph contains a cycle, no ordering exists
    #[error("[G003] Cyclic dependency detected: {cycle}")]
    CyclicGraph { cycle: String },

    /// E001: Model file path cannot be mapped to a logical path
    #[error("[E001] Invalid model path: {path}")]
    InvalidModelPath { path: String },

    /// E002: Model SQL file is empty
    #[error("[E002] Model '{name}' has an empty SQL file")]
    EmptyModel { name: String },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
