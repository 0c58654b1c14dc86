//! Persisted record shapes

use chrono::{DateTime, Utc};
use qy_core::Model;
use serde::{Deserialize, Serialize};

/// A model with its store-assigned ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredModel {
    /// Store-assigned ID, stable across upserts of the same logical path
    pub id: i64,

    #[serde(flatten)]
    pub model: Model,
}

/// A registered macro
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroRecord {
    /// Store-assigned ID
    pub id: i64,

    /// Macro name (file stem)
    pub name: String,

    /// Absolute path to the macro source file
    pub file_path: String,

    /// Functions the file defines
    #[serde(default)]
    pub functions: Vec<String>,
}

/// One column of a schema snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Column name
    pub name: String,

    /// Database type name
    pub data_type: String,
}

/// Column shape of one source relation, captured after a wildcard model
/// materialized.
///
/// Wildcard projections inherit their shape from upstream relations, so
/// a source gaining or losing columns silently changes what the model
/// produces. Comparing snapshots of the same (model, source) pair across
/// runs surfaces that drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Logical path of the wildcard model
    pub model_path: String,

    /// Source relation whose columns were captured
    pub source_table: String,

    /// Run during which the snapshot was taken
    pub run_id: i64,

    /// Columns in ordinal position order
    pub columns: Vec<ColumnSnapshot>,

    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Capture a snapshot now
    pub fn new(
        model_path: impl Into<String>,
        source_table: impl Into<String>,
        run_id: i64,
        columns: Vec<ColumnSnapshot>,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            source_table: source_table.into(),
            run_id,
            columns,
            captured_at: Utc::now(),
        }
    }

    /// Whether another snapshot has a different column shape
    pub fn differs_from(&self, other: &SchemaSnapshot) -> bool {
        self.columns != other.columns
    }
}
