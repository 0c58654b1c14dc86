//! Model representation
//!
//! A model is one unit of SQL-defined work. Discovery creates a fresh
//! `Model` from file content on every re-parse; records are superseded,
//! never mutated in place.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Kind of source artifact tracked by the content-hash store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// SQL model file
    Model,
    /// Jinja macro file
    Macro,
    /// CSV seed file
    Seed,
}

impl ArtifactKind {
    /// Stable string form used as part of persisted hash keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Model => "model",
            ArtifactKind::Macro => "macro",
            ArtifactKind::Seed => "seed",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write strategy for a model's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    /// Create or replace a view
    #[default]
    View,
    /// Drop and recreate a table from the full query
    Table,
    /// Upsert or append into an existing table
    Incremental,
}

impl Materialization {
    /// Parse from the string form used in `config()` blocks
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(Materialization::View),
            "table" => Some(Materialization::Table),
            "incremental" => Some(Materialization::Incremental),
            _ => None,
        }
    }
}

impl std::fmt::Display for Materialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Materialization::View => write!(f, "view"),
            Materialization::Table => write!(f, "table"),
            Materialization::Incremental => write!(f, "incremental"),
        }
    }
}

/// Configuration declared by a model's `config()` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Materialization kind (defaults to view)
    #[serde(default)]
    pub materialized: Materialization,

    /// Unique key column for incremental upsert
    #[serde(default)]
    pub unique_key: Option<String>,

    /// Target schema override
    #[serde(default)]
    pub schema: Option<String>,

    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Owning team or person
    #[serde(default)]
    pub owner: Option<String>,

    /// Arbitrary key-value metadata
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Column-level lineage for one output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLineage {
    /// Output column name (`*` for a wildcard projection)
    pub column: String,

    /// Source columns contributing to the output, `table.column` or bare
    #[serde(default)]
    pub sources: Vec<String>,
}

/// A unit of SQL-defined work discovered from a model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Logical path, the unique key (e.g. `staging.customers`)
    pub path: String,

    /// Display name (file stem)
    pub name: String,

    /// Absolute path to the source SQL file
    pub file_path: PathBuf,

    /// Raw SQL content before template rendering
    pub raw_sql: String,

    /// Declared configuration
    #[serde(default)]
    pub config: ModelConfig,

    /// Auto-detected source table references, sorted
    #[serde(default)]
    pub sources: BTreeSet<String>,

    /// Column lineage extracted from the projection
    #[serde(default)]
    pub lineage: Vec<ColumnLineage>,

    /// Whether the projection contains an unqualified `*`
    #[serde(default)]
    pub has_wildcard: bool,
}

impl Model {
    /// Derive the logical path for a model file relative to the models root.
    ///
    /// Directory components and the file stem are joined with dots:
    /// `<root>/staging/customers.sql` becomes `staging.customers`.
    pub fn logical_path(models_root: &Path, file_path: &Path) -> CoreResult<String> {
        let rel = file_path
            .strip_prefix(models_root)
            .map_err(|_| CoreError::InvalidModelPath {
                path: file_path.display().to_string(),
            })?;

        let mut parts: Vec<String> = Vec::new();
        for component in rel.components() {
            let Some(s) = component.as_os_str().to_str() else {
                return Err(CoreError::InvalidModelPath {
                    path: file_path.display().to_string(),
                });
            };
            parts.push(s.to_string());
        }
        let Some(last) = parts.last_mut() else {
            return Err(CoreError::InvalidModelPath {
                path: file_path.display().to_string(),
            });
        };
        *last = Path::new(last)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CoreError::InvalidModelPath {
                path: file_path.display().to_string(),
            })?
            .to_string();

        Ok(parts.join("."))
    }

    /// Display name for a model file (the file stem)
    pub fn display_name(file_path: &Path) -> CoreResult<String> {
        file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::InvalidModelPath {
                path: file_path.display().to_string(),
            })
    }

    /// Table name the model materializes into, schema-qualified when a
    /// target schema is configured.
    pub fn target_relation(&self) -> String {
        match &self.config.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// Whether this model is configured for incremental materialization
    pub fn is_incremental(&self) -> bool {
        self.config.materialized == Materialization::Incremental
    }
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
