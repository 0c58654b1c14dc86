//! Run orchestration
//!
//! A run has two phases over a topologically ordered target set. Phase
//! one renders and parse-checks every model before anything executes;
//! every model gets a chance to validate, and any failure means nothing
//! executes and the database is left untouched. Phase two materializes
//! in order and aborts on the first failure, skipping every model that
//! has not run yet.

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::materialize::materialize;
use qy_core::{Model, ModelRun, ModelRunStatus, Run, RunStatus};
use qy_render::{RenderContext, Rendered, SqlRenderer};
use qy_sql::SqlParser;
use qy_store::{ColumnSnapshot, SchemaSnapshot};
use std::collections::HashSet;
use std::time::Instant;

/// Snapshot history retained per (model, source) pair after a
/// successful run
const SNAPSHOT_KEEP: usize = 5;

/// Final state of one model in a run
#[derive(Debug, Clone)]
pub struct ModelOutcome {
    /// Logical path of the model
    pub path: String,

    /// Terminal status
    pub status: ModelRunStatus,

    /// Rows affected when successful
    pub rows_affected: usize,

    /// Error or skip reason
    pub error: Option<String>,
}

/// Result of one run, in execution order
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The persisted run record
    pub run: Run,

    /// Per-model outcomes in topological order
    pub outcomes: Vec<ModelOutcome>,
}

impl RunReport {
    /// Outcome for a model by logical path
    pub fn outcome(&self, path: &str) -> Option<&ModelOutcome> {
        self.outcomes.iter().find(|o| o.path == path)
    }

    /// Whether every model succeeded
    pub fn succeeded(&self) -> bool {
        self.run.status == RunStatus::Completed
    }
}

struct PlannedModel {
    path: String,
    model_run: ModelRun,
    rendered: Option<Rendered>,
}

impl Engine {
    /// Run every discovered model
    pub async fn run(&mut self) -> EngineResult<RunReport> {
        let run = self.store.create_run(&Run::new(&self.config.environment))?;
        let order = match self.graph.topological_sort() {
            Ok(order) => order,
            Err(e) => return self.finish_run(run, Vec::new(), Some(e.to_string())),
        };
        self.execute_run(run, order).await
    }

    /// Run a selection of models, optionally with everything downstream
    /// of them. Upstream dependencies outside the selection are assumed
    /// already materialized.
    pub async fn run_select(
        &mut self,
        selection: &[String],
        include_downstream: bool,
    ) -> EngineResult<RunReport> {
        for path in selection {
            if !self.graph.contains(path) {
                return Err(EngineError::UnknownModel { path: path.clone() });
            }
        }
        let working: HashSet<String> = if include_downstream {
            self.graph.affected_nodes(selection).into_iter().collect()
        } else {
            selection.iter().cloned().collect()
        };
        let run = self.store.create_run(&Run::new(&self.config.environment))?;
        let order = match self.graph.subgraph(&working).topological_sort() {
            Ok(order) => order,
            Err(e) => return self.finish_run(run, Vec::new(), Some(e.to_string())),
        };
        self.execute_run(run, order).await
    }

    async fn execute_run(&mut self, run: Run, order: Vec<String>) -> EngineResult<RunReport> {
        log::info!(
            "run {} started: {} models in {}",
            run.id,
            order.len(),
            run.environment
        );

        let mut planned: Vec<PlannedModel> = Vec::with_capacity(order.len());
        match self.run_phases(run.id, &order, &mut planned).await {
            Ok(None) => {
                let mut run = run;
                run.status = RunStatus::Completed;
                run.finished_at = Some(chrono::Utc::now());
                self.store.update_run(&run)?;
                self.store.prune_snapshots(SNAPSHOT_KEEP)?;
                log::info!("run {} completed", run.id);
                Ok(build_report(run, planned))
            }
            Ok(Some(error)) => self.finish_run(run, planned, Some(error)),
            Err(e) => {
                // A store or database fault mid-run. The records still
                // have to reach a terminal state before the fault
                // propagates.
                self.abort_run(run, &mut planned, &e.to_string());
                Err(e)
            }
        }
    }

    /// Plan and drive both phases of a run.
    ///
    /// `Ok(Some(error))` is an orderly failure: every ModelRun is already
    /// terminal and the caller finalizes the Run with that error. `Err`
    /// is an infrastructure fault; the caller must still finalize.
    async fn run_phases(
        &mut self,
        run_id: i64,
        order: &[String],
        planned: &mut Vec<PlannedModel>,
    ) -> EngineResult<Option<String>> {
        let mut problems: Vec<String> = Vec::new();

        for path in order {
            match self.store.get_model(path)? {
                Some(stored) => {
                    let model_run = self
                        .store
                        .create_model_run(&ModelRun::pending(run_id, stored.id))?;
                    planned.push(PlannedModel {
                        path: path.clone(),
                        model_run,
                        rendered: None,
                    });
                }
                None => {
                    // The store lost this model's record since discovery.
                    // Record the failure and keep validating the rest.
                    let message = format!("no persisted record for model '{}'", path);
                    log::error!("{}", message);
                    let mut model_run =
                        self.store.create_model_run(&ModelRun::pending(run_id, 0))?;
                    model_run.mark_failed(message.clone());
                    self.store.update_model_run(&model_run)?;
                    problems.push(format!("'{}': {}", path, message));
                    planned.push(PlannedModel {
                        path: path.clone(),
                        model_run,
                        rendered: None,
                    });
                }
            }
        }

        // Phase 1: render and validate everything before touching the
        // database. Every model gets a chance to validate, so one bad
        // template does not hide errors in the others.
        let validator = SqlParser::new();
        for i in 0..planned.len() {
            if planned[i].model_run.status != ModelRunStatus::Pending {
                continue;
            }
            let path = planned[i].path.clone();
            let model = self.model_or_err(&path)?.clone();
            let started = Instant::now();

            match render_and_validate(self.renderer.as_ref(), &validator, &model) {
                Ok(rendered) => {
                    planned[i].model_run.render_ms = started.elapsed().as_millis() as u64;
                    planned[i].rendered = Some(rendered);
                }
                Err(e) => {
                    let message = format!("'{}': {}", path, e);
                    log::error!("render failed for {}", message);
                    planned[i].model_run.mark_failed(e.to_string());
                    self.store.update_model_run(&planned[i].model_run)?;
                    problems.push(message);
                }
            }
        }
        if !problems.is_empty() {
            let reason = format!("run aborted: {} model(s) failed to render", problems.len());
            self.skip_pending(planned, &reason)?;
            return Ok(Some(problems.join("; ")));
        }

        // Phase 2: execute in order, abort on first failure.
        for i in 0..planned.len() {
            let path = planned[i].path.clone();
            let model = self.model_or_err(&path)?.clone();
            // Rendered in phase 1 for every planned model.
            let Some(rendered) = planned[i].rendered.clone() else {
                continue;
            };

            planned[i].model_run.mark_running();
            self.store.update_model_run(&planned[i].model_run)?;

            let started = Instant::now();
            match materialize(self.db.as_ref(), &model, &rendered).await {
                Ok(rows) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    planned[i].model_run.mark_success(rows, elapsed);
                    self.store.update_model_run(&planned[i].model_run)?;
                    log::info!("built '{}' ({} rows, {}ms)", path, rows, elapsed);

                    if model.has_wildcard {
                        self.snapshot_sources(&model, run_id).await?;
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    log::error!("execution failed for '{}': {}", path, message);
                    planned[i].model_run.mark_failed(message.clone());
                    self.store.update_model_run(&planned[i].model_run)?;
                    let reason = format!("run aborted: model '{}' failed", path);
                    self.skip_pending(planned, &reason)?;
                    return Ok(Some(message));
                }
            }
        }

        Ok(None)
    }

    /// Terminal bookkeeping for a store or database fault mid-run.
    ///
    /// Best effort throughout: the original fault is what the caller
    /// reports, and a store that just failed may fail again here.
    fn abort_run(&self, mut run: Run, planned: &mut [PlannedModel], message: &str) {
        for p in planned.iter_mut() {
            match p.model_run.status {
                ModelRunStatus::Running => p.model_run.mark_failed(message),
                ModelRunStatus::Pending => p.model_run.mark_skipped("run aborted: internal error"),
                _ => continue,
            }
            if let Err(e) = self.store.update_model_run(&p.model_run) {
                log::warn!("could not record aborted state of '{}': {}", p.path, e);
            }
        }
        run.status = RunStatus::Failed;
        run.error = Some(message.to_string());
        run.finished_at = Some(chrono::Utc::now());
        if let Err(e) = self.store.update_run(&run) {
            log::warn!("could not finalize run {}: {}", run.id, e);
        }
        log::warn!("run {} aborted: {}", run.id, message);
    }

    fn model_or_err(&self, path: &str) -> EngineResult<&Model> {
        self.models
            .get(path)
            .ok_or_else(|| EngineError::UnknownModel {
                path: path.to_string(),
            })
    }

    /// Mark every still-pending model as skipped with a traceable reason
    fn skip_pending(&self, planned: &mut [PlannedModel], reason: &str) -> EngineResult<()> {
        for p in planned.iter_mut() {
            if p.model_run.status == ModelRunStatus::Pending {
                p.model_run.mark_skipped(reason);
                self.store.update_model_run(&p.model_run)?;
            }
        }
        Ok(())
    }

    fn finish_run(
        &self,
        mut run: Run,
        planned: Vec<PlannedModel>,
        error: Option<String>,
    ) -> EngineResult<RunReport> {
        run.status = RunStatus::Failed;
        run.error = error;
        run.finished_at = Some(chrono::Utc::now());
        self.store.update_run(&run)?;
        log::warn!("run {} failed", run.id);
        Ok(build_report(run, planned))
    }

    /// Record the current column shape of a wildcard model's sources.
    ///
    /// Wildcard projections inherit their shape from upstream, so a
    /// source gaining or losing columns silently changes what the model
    /// produces; drift is only visible by comparing catalog snapshots
    /// across runs. A snapshot failure is logged, not fatal; the build
    /// itself succeeded.
    async fn snapshot_sources(&self, model: &Model, run_id: i64) -> EngineResult<()> {
        for source in &model.sources {
            let relation = match self.resolve_source(source) {
                Some(parent) => parent.target_relation(),
                None => source.clone(),
            };
            let columns = match self.db.table_columns(&relation).await {
                Ok(cols) => cols,
                Err(e) => {
                    log::warn!("could not snapshot columns of '{}': {}", relation, e);
                    continue;
                }
            };

            let snapshot = SchemaSnapshot::new(
                model.path.clone(),
                source.clone(),
                run_id,
                columns
                    .into_iter()
                    .map(|c| ColumnSnapshot {
                        name: c.name,
                        data_type: c.data_type,
                    })
                    .collect(),
            );

            if let Some(prior) = self.store.latest_snapshot(&model.path, source)? {
                if snapshot.differs_from(&prior) {
                    log::warn!(
                        "schema drift on source '{}' of wildcard model '{}': {} -> {} columns",
                        source,
                        model.path,
                        prior.columns.len(),
                        snapshot.columns.len()
                    );
                }
            }
            self.store.save_snapshot(&snapshot)?;
        }
        Ok(())
    }
}

/// Render a model for execution and parse-check the output
fn render_and_validate(
    renderer: &dyn SqlRenderer,
    validator: &SqlParser,
    model: &Model,
) -> EngineResult<Rendered> {
    let target = model.target_relation();
    let ctx = RenderContext {
        model_name: &model.name,
        target_relation: &target,
    };
    let rendered = renderer.render(&model.raw_sql, &ctx)?;

    validator.parse(&rendered.sql)?;
    if let Some(inc) = &rendered.incremental_sql {
        validator.parse(inc)?;
    }
    Ok(rendered)
}

fn build_report(run: Run, planned: Vec<PlannedModel>) -> RunReport {
    let outcomes = planned
        .into_iter()
        .map(|p| ModelOutcome {
            path: p.path,
            status: p.model_run.status,
            rows_affected: p.model_run.rows_affected,
            error: p.model_run.error,
        })
        .collect();
    RunReport { run, outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineConfig};
    use qy_db::DuckDbBackend;
    use qy_store::{JsonStore, StateStore};
    use std::sync::Arc;

    fn bare_engine() -> (Engine, Arc<JsonStore>) {
        let db = Arc::new(DuckDbBackend::in_memory().unwrap());
        let store = Arc::new(JsonStore::ephemeral());
        let config = EngineConfig::new(std::env::temp_dir(), "test");
        (Engine::new(config, db, store.clone()), store)
    }

    #[tokio::test]
    async fn test_sort_failure_still_finalizes_the_run() {
        let (mut engine, store) = bare_engine();
        engine.graph.add_node("a", ());
        engine.graph.add_node("b", ());
        engine.graph.add_edge("a", "b").unwrap();
        engine.graph.add_edge("b", "a").unwrap();

        let report = engine.run().await.unwrap();
        assert!(!report.succeeded());
        assert!(report.run.error.as_deref().unwrap().contains("[G003]"));

        // The run record exists and is terminal even though ordering
        // never produced a plan.
        let persisted = store.get_run(report.run.id).unwrap().unwrap();
        assert_eq!(persisted.status, RunStatus::Failed);
        assert!(persisted.finished_at.is_some());
        assert!(store.list_model_runs(report.run.id).unwrap().is_empty());
    }
}
