//! qy-core - Core library for Quarry
//!
//! This crate provides the shared types used across all Quarry components:
//! the dependency graph with its ordering algorithms, model and run records,
//! artifact kinds, and the content-hash helper used for change detection.

pub mod checksum;
pub mod error;
pub mod graph;
pub mod model;
pub mod run;

pub use checksum::content_hash;
pub use error::{CoreError, CoreResult};
pub use graph::Graph;
pub use model::{ArtifactKind, ColumnLineage, Materialization, Model, ModelConfig};
pub use run::{ModelRun, ModelRunStatus, Run, RunStatus};
