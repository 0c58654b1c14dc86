//! Error types for qy-engine

use thiserror::Error;

/// Engine errors, mostly wrappers over the layer-specific error types
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] qy_core::CoreError),

    #[error(transparent)]
    Sql(#[from] qy_sql::SqlError),

    #[error(transparent)]
    Render(#[from] qy_render::RenderError),

    #[error(transparent)]
    Store(#[from] qy_store::StoreError),

    #[error(transparent)]
    Db(#[from] qy_db::DbError),

    /// Selection names a model the graph does not contain (Q001)
    #[error("[Q001] unknown model: {path}")]
    UnknownModel { path: String },

    /// A config() value could not be interpreted (Q002)
    #[error("[Q002] invalid config value for '{key}' in model '{model}': {value}")]
    InvalidConfig {
        model: String,
        key: String,
        value: String,
    },

    /// Filesystem failure during discovery (Q003)
    #[error("[Q003] I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for EngineError
pub type EngineResult<T> = Result<T, EngineError>;
