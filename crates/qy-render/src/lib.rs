//! qy-render - SQL templating layer for Quarry
//!
//! Provides a Jinja templating environment with `config()`, `var()`,
//! `env()`, `error()`, `is_incremental()`, and `this`, plus a macro
//! registry that takes effect on the next render.

pub mod error;
pub mod functions;
pub mod renderer;

pub use error::{RenderError, RenderResult};
pub use renderer::{JinjaRenderer, RenderContext, Rendered, SqlRenderer};
