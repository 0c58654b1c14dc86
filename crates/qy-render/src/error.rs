//! Error types for qy-render

use thiserror::Error;

/// Template rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Template render error (R001)
    #[error("[R001] template render error: {0}")]
    Render(String),

    /// Invalid config value (R002)
    #[error("[R002] invalid config value for '{key}': {value}")]
    InvalidConfigValue { key: String, value: String },

    /// Internal error
    #[error("internal render error: {0}")]
    Internal(String),
}

/// Result type alias for RenderError
pub type RenderResult<T> = Result<T, RenderError>;

impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        RenderError::Render(err.to_string())
    }
}
