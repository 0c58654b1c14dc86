//! JSON-file state store
//!
//! The whole store is one JSON document. Every mutation rewrites it with
//! the write-to-temp-then-rename pattern so a crash mid-save never leaves
//! a corrupt file. Temp names include the PID to avoid races between
//! concurrent processes.

use crate::error::{StoreError, StoreResult};
use crate::records::{MacroRecord, SchemaSnapshot, StoredModel};
use crate::traits::StateStore;
use chrono::{DateTime, Utc};
use qy_core::{ArtifactKind, Model, ModelRun, Run};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    /// Last assigned record ID
    #[serde(default)]
    next_id: i64,

    #[serde(default)]
    updated_at: DateTime<Utc>,

    /// Content hashes keyed by `<kind>:<path>`
    #[serde(default)]
    hashes: BTreeMap<String, String>,

    /// Models keyed by logical path
    #[serde(default)]
    models: BTreeMap<String, StoredModel>,

    /// Parent ID sets keyed by child model ID
    #[serde(default)]
    dependencies: BTreeMap<i64, Vec<i64>>,

    /// Macros keyed by name
    #[serde(default)]
    macros: BTreeMap<String, MacroRecord>,

    /// Schema snapshot history, in capture order
    #[serde(default)]
    snapshots: Vec<SchemaSnapshot>,

    #[serde(default)]
    runs: Vec<Run>,

    #[serde(default)]
    model_runs: Vec<ModelRun>,
}

impl StoreData {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// State store backed by a single JSON file
pub struct JsonStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl JsonStore {
    /// Open a store at a path, creating an empty one if the file is absent
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            serde_json::from_str(&content)?
        } else {
            StoreData::default()
        };
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// In-memory store with no backing file, for tests
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreData>> {
        self.data.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Apply a mutation and persist the result
    fn mutate<R>(&self, f: impl FnOnce(&mut StoreData) -> R) -> StoreResult<R> {
        let mut data = self.lock()?;
        let result = f(&mut data);
        data.updated_at = Utc::now();
        if let Some(path) = &self.path {
            persist(&data, path)?;
        }
        Ok(result)
    }
}

fn persist(data: &StoreData, path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(&temp_path, &json).map_err(|e| StoreError::Io {
        path: temp_path.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        StoreError::Io {
            path: path.display().to_string(),
            source: e,
        }
    })?;
    Ok(())
}

fn hash_key(kind: ArtifactKind, path: &str) -> String {
    format!("{}:{}", kind.as_str(), path)
}

impl StateStore for JsonStore {
    fn get_hash(&self, kind: ArtifactKind, path: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.hashes.get(&hash_key(kind, path)).cloned())
    }

    fn set_hash(&self, kind: ArtifactKind, path: &str, hash: &str) -> StoreResult<()> {
        self.mutate(|data| {
            data.hashes.insert(hash_key(kind, path), hash.to_string());
        })
    }

    fn delete_hash(&self, kind: ArtifactKind, path: &str) -> StoreResult<()> {
        self.mutate(|data| {
            data.hashes.remove(&hash_key(kind, path));
        })
    }

    fn list_hashes(&self, kind: ArtifactKind) -> StoreResult<Vec<(String, String)>> {
        let prefix = format!("{}:", kind.as_str());
        Ok(self
            .lock()?
            .hashes
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|path| (path.to_string(), v.clone()))
            })
            .collect())
    }

    fn upsert_model(&self, model: &Model) -> StoreResult<StoredModel> {
        self.mutate(|data| {
            let id = match data.models.get(&model.path) {
                Some(existing) => existing.id,
                None => data.assign_id(),
            };
            let stored = StoredModel {
                id,
                model: model.clone(),
            };
            data.models.insert(model.path.clone(), stored.clone());
            stored
        })
    }

    fn get_model(&self, path: &str) -> StoreResult<Option<StoredModel>> {
        Ok(self.lock()?.models.get(path).cloned())
    }

    fn list_models(&self) -> StoreResult<Vec<StoredModel>> {
        Ok(self.lock()?.models.values().cloned().collect())
    }

    fn delete_model(&self, path: &str) -> StoreResult<()> {
        self.mutate(|data| {
            let removed = data.models.remove(path);
            data.snapshots.retain(|s| s.model_path != path);
            if let Some(stored) = removed {
                data.dependencies.remove(&stored.id);
                for parents in data.dependencies.values_mut() {
                    parents.retain(|p| *p != stored.id);
                }
            }
        })
    }

    fn replace_dependencies(&self, model_id: i64, parent_ids: &[i64]) -> StoreResult<()> {
        self.mutate(|data| {
            let mut sorted = parent_ids.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            data.dependencies.insert(model_id, sorted);
        })
    }

    fn get_dependencies(&self, model_id: i64) -> StoreResult<Vec<i64>> {
        Ok(self
            .lock()?
            .dependencies
            .get(&model_id)
            .cloned()
            .unwrap_or_default())
    }

    fn upsert_macro(
        &self,
        name: &str,
        file_path: &str,
        functions: &[String],
    ) -> StoreResult<MacroRecord> {
        self.mutate(|data| {
            let id = match data.macros.get(name) {
                Some(existing) => existing.id,
                None => data.assign_id(),
            };
            let record = MacroRecord {
                id,
                name: name.to_string(),
                file_path: file_path.to_string(),
                functions: functions.to_vec(),
            };
            data.macros.insert(name.to_string(), record.clone());
            record
        })
    }

    fn delete_macro(&self, name: &str) -> StoreResult<()> {
        self.mutate(|data| {
            data.macros.remove(name);
        })
    }

    fn list_macros(&self) -> StoreResult<Vec<MacroRecord>> {
        Ok(self.lock()?.macros.values().cloned().collect())
    }

    fn save_snapshot(&self, snapshot: &SchemaSnapshot) -> StoreResult<()> {
        self.mutate(|data| {
            data.snapshots.push(snapshot.clone());
        })
    }

    fn latest_snapshot(
        &self,
        model_path: &str,
        source_table: &str,
    ) -> StoreResult<Option<SchemaSnapshot>> {
        Ok(self
            .lock()?
            .snapshots
            .iter()
            .rev()
            .find(|s| s.model_path == model_path && s.source_table == source_table)
            .cloned())
    }

    fn list_snapshots(&self, model_path: &str) -> StoreResult<Vec<SchemaSnapshot>> {
        Ok(self
            .lock()?
            .snapshots
            .iter()
            .filter(|s| s.model_path == model_path)
            .cloned()
            .collect())
    }

    fn prune_snapshots(&self, keep: usize) -> StoreResult<()> {
        self.mutate(|data| {
            // Count down per (model, source) group from the newest end,
            // dropping everything past the keep limit.
            let mut seen: BTreeMap<(String, String), usize> = BTreeMap::new();
            let mut retained: Vec<SchemaSnapshot> = Vec::with_capacity(data.snapshots.len());
            for snapshot in data.snapshots.iter().rev() {
                let key = (snapshot.model_path.clone(), snapshot.source_table.clone());
                let count = seen.entry(key).or_insert(0);
                if *count < keep {
                    *count += 1;
                    retained.push(snapshot.clone());
                }
            }
            retained.reverse();
            data.snapshots = retained;
        })
    }

    fn create_run(&self, run: &Run) -> StoreResult<Run> {
        self.mutate(|data| {
            let mut run = run.clone();
            run.id = data.assign_id();
            data.runs.push(run.clone());
            run
        })
    }

    fn update_run(&self, run: &Run) -> StoreResult<()> {
        self.mutate(|data| {
            match data.runs.iter_mut().find(|r| r.id == run.id) {
                Some(existing) => {
                    *existing = run.clone();
                    Ok(())
                }
                None => Err(StoreError::NotFound {
                    what: "run",
                    key: run.id.to_string(),
                }),
            }
        })?
    }

    fn get_run(&self, id: i64) -> StoreResult<Option<Run>> {
        Ok(self.lock()?.runs.iter().find(|r| r.id == id).cloned())
    }

    fn create_model_run(&self, model_run: &ModelRun) -> StoreResult<ModelRun> {
        self.mutate(|data| {
            let mut mr = model_run.clone();
            mr.id = data.assign_id();
            data.model_runs.push(mr.clone());
            mr
        })
    }

    fn update_model_run(&self, model_run: &ModelRun) -> StoreResult<()> {
        self.mutate(|data| {
            match data.model_runs.iter_mut().find(|m| m.id == model_run.id) {
                Some(existing) => {
                    *existing = model_run.clone();
                    Ok(())
                }
                None => Err(StoreError::NotFound {
                    what: "model run",
                    key: model_run.id.to_string(),
                }),
            }
        })?
    }

    fn list_model_runs(&self, run_id: i64) -> StoreResult<Vec<ModelRun>> {
        let mut runs: Vec<ModelRun> = self
            .lock()?
            .model_runs
            .iter()
            .filter(|m| m.run_id == run_id)
            .cloned()
            .collect();
        runs.sort_by_key(|m| m.id);
        Ok(runs)
    }
}

#[cfg(test)]
#[path = "json_test.rs"]
mod tests;
