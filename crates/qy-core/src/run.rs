//! Run and ModelRun records
//!
//! A `Run` is one execution attempt over the graph (or a selection); a
//! `ModelRun` is one model's participation in it. Both are persisted by
//! the state store; status transitions happen through the helpers here so
//! every record ends in a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is in progress
    Running,
    /// All executed models succeeded
    Completed,
    /// At least one phase failed
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status of one model within a run
///
/// Transitions: pending -> running -> {success, failed}, or
/// pending -> skipped / pending -> failed when the run aborts before the
/// model ever executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRunStatus {
    /// Created in phase 1, not yet executed
    Pending,
    /// Currently executing
    Running,
    /// Materialized successfully
    Success,
    /// Render or execution failed
    Failed,
    /// Never executed because the run aborted
    Skipped,
}

impl ModelRunStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModelRunStatus::Success | ModelRunStatus::Failed | ModelRunStatus::Skipped
        )
    }
}

impl std::fmt::Display for ModelRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelRunStatus::Pending => write!(f, "pending"),
            ModelRunStatus::Running => write!(f, "running"),
            ModelRunStatus::Success => write!(f, "success"),
            ModelRunStatus::Failed => write!(f, "failed"),
            ModelRunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One execution attempt over the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Store-assigned ID (0 until persisted)
    pub id: i64,

    /// Environment label (e.g. `dev`, `prod`)
    pub environment: String,

    /// Current status
    pub status: RunStatus,

    /// Aggregated error text when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Create a new in-progress run
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            id: 0,
            environment: environment.into(),
            status: RunStatus::Running,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// One model's participation in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRun {
    /// Store-assigned ID (0 until persisted)
    pub id: i64,

    /// Owning run
    pub run_id: i64,

    /// Persisted model ID
    pub model_id: i64,

    /// Current status
    pub status: ModelRunStatus,

    /// Rows affected by execution
    #[serde(default)]
    pub rows_affected: usize,

    /// Error or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Time spent rendering SQL, in milliseconds
    #[serde(default)]
    pub render_ms: u64,

    /// Time spent executing, in milliseconds
    #[serde(default)]
    pub execute_ms: u64,
}

impl ModelRun {
    /// Create a pending model run
    pub fn pending(run_id: i64, model_id: i64) -> Self {
        Self {
            id: 0,
            run_id,
            model_id,
            status: ModelRunStatus::Pending,
            rows_affected: 0,
            error: None,
            render_ms: 0,
            execute_ms: 0,
        }
    }

    /// Mark as currently executing
    pub fn mark_running(&mut self) {
        self.status = ModelRunStatus::Running;
    }

    /// Mark as successfully materialized
    pub fn mark_success(&mut self, rows_affected: usize, execute_ms: u64) {
        self.status = ModelRunStatus::Success;
        self.rows_affected = rows_affected;
        self.execute_ms = execute_ms;
        self.error = None;
    }

    /// Mark as failed with an error message
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ModelRunStatus::Failed;
        self.error = Some(error.into());
    }

    /// Mark as skipped with a traceable reason
    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = ModelRunStatus::Skipped;
        self.error = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_run_transitions() {
        let mut mr = ModelRun::pending(1, 7);
        assert_eq!(mr.status, ModelRunStatus::Pending);
        assert!(!mr.status.is_terminal());

        mr.mark_running();
        assert_eq!(mr.status, ModelRunStatus::Running);

        mr.mark_success(42, 120);
        assert_eq!(mr.status, ModelRunStatus::Success);
        assert_eq!(mr.rows_affected, 42);
        assert!(mr.status.is_terminal());
    }

    #[test]
    fn test_skip_records_reason() {
        let mut mr = ModelRun::pending(1, 7);
        mr.mark_skipped("run aborted: model 'b' failed");
        assert_eq!(mr.status, ModelRunStatus::Skipped);
        assert!(mr.error.as_deref().unwrap().contains("aborted"));
    }

    #[test]
    fn test_run_starts_running() {
        let run = Run::new("dev");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
    }
}
