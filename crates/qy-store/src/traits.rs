//! State store abstraction

use crate::error::StoreResult;
use crate::records::{MacroRecord, SchemaSnapshot, StoredModel};
use qy_core::{ArtifactKind, Model, ModelRun, Run};

/// Persistent state consulted and updated by discovery and runs.
///
/// Implementations must be safe to share across threads; every method
/// takes `&self` and mutations go through interior locking. A mutation
/// is durable once its method returns.
pub trait StateStore: Send + Sync {
    // Content hashes, keyed by artifact kind and source path

    /// Last recorded content hash for a source file
    fn get_hash(&self, kind: ArtifactKind, path: &str) -> StoreResult<Option<String>>;

    /// Record a content hash, replacing any previous value
    fn set_hash(&self, kind: ArtifactKind, path: &str, hash: &str) -> StoreResult<()>;

    /// Forget a hash (the source file was deleted)
    fn delete_hash(&self, kind: ArtifactKind, path: &str) -> StoreResult<()>;

    /// All recorded `(path, hash)` pairs of a kind, sorted by path
    fn list_hashes(&self, kind: ArtifactKind) -> StoreResult<Vec<(String, String)>>;

    // Models

    /// Insert or replace a model record, keyed by logical path.
    ///
    /// The ID of an existing record is preserved; new records get a fresh
    /// one.
    fn upsert_model(&self, model: &Model) -> StoreResult<StoredModel>;

    /// Look up a model by logical path
    fn get_model(&self, path: &str) -> StoreResult<Option<StoredModel>>;

    /// All model records, sorted by logical path
    fn list_models(&self) -> StoreResult<Vec<StoredModel>>;

    /// Remove a model record and its dependency edges
    fn delete_model(&self, path: &str) -> StoreResult<()>;

    // Dependencies

    /// Replace the recorded parent set of a model, as persisted model IDs
    fn replace_dependencies(&self, model_id: i64, parent_ids: &[i64]) -> StoreResult<()>;

    /// Recorded parent IDs of a model, sorted
    fn get_dependencies(&self, model_id: i64) -> StoreResult<Vec<i64>>;

    // Macros

    /// Insert or replace a macro record, keyed by name
    fn upsert_macro(&self, name: &str, file_path: &str, functions: &[String])
        -> StoreResult<MacroRecord>;

    /// Remove a macro record
    fn delete_macro(&self, name: &str) -> StoreResult<()>;

    /// All macro records, sorted by name
    fn list_macros(&self) -> StoreResult<Vec<MacroRecord>>;

    // Schema snapshots

    /// Append a snapshot of one source relation's column shape
    fn save_snapshot(&self, snapshot: &SchemaSnapshot) -> StoreResult<()>;

    /// Most recent snapshot for a (model, source) pair
    fn latest_snapshot(
        &self,
        model_path: &str,
        source_table: &str,
    ) -> StoreResult<Option<SchemaSnapshot>>;

    /// All snapshots for a model, oldest first
    fn list_snapshots(&self, model_path: &str) -> StoreResult<Vec<SchemaSnapshot>>;

    /// Drop all but the `keep` most recent snapshots of every
    /// (model, source) pair
    fn prune_snapshots(&self, keep: usize) -> StoreResult<()>;

    // Runs

    /// Persist a new run and return it with its assigned ID
    fn create_run(&self, run: &Run) -> StoreResult<Run>;

    /// Update an existing run record
    fn update_run(&self, run: &Run) -> StoreResult<()>;

    /// Look up a run by ID
    fn get_run(&self, id: i64) -> StoreResult<Option<Run>>;

    /// Persist a new model run and return it with its assigned ID
    fn create_model_run(&self, model_run: &ModelRun) -> StoreResult<ModelRun>;

    /// Update an existing model run record
    fn update_model_run(&self, model_run: &ModelRun) -> StoreResult<()>;

    /// All model runs belonging to a run, ordered by ID
    fn list_model_runs(&self, run_id: i64) -> StoreResult<Vec<ModelRun>>;
}
