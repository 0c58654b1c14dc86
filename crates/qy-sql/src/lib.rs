//! qy-sql - SQL parsing layer for Quarry
//!
//! This crate wraps sqlparser-rs with the DuckDB dialect and provides
//! source table extraction and projection analysis over the AST.

pub mod analyze;
pub mod error;
pub mod parser;

pub use analyze::{analyze_statement, extract_sources, OutputColumn, QueryAnalysis};
pub use error::{SqlError, SqlResult};
pub use parser::SqlParser;
