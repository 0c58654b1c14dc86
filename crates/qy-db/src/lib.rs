//! qy-db - database backends for Quarry
//!
//! Defines the async [`Database`] trait the engine materializes through,
//! with a DuckDB implementation as the default backend.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use crate::duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{ColumnInfo, Database};
