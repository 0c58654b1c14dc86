//! qy-store - state persistence for Quarry
//!
//! Tracks source content hashes, discovered models and their dependency
//! edges, macros, schema snapshots, and run history. The default backend
//! is a single JSON file written atomically on every mutation.

pub mod error;
pub mod json;
pub mod records;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use json::JsonStore;
pub use records::{ColumnSnapshot, MacroRecord, SchemaSnapshot, StoredModel};
pub use traits::StateStore;
