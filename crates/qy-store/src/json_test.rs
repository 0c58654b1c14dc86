use super::*;
use crate::records::ColumnSnapshot;
use qy_core::{ModelConfig, ModelRunStatus, RunStatus};
use std::collections::BTreeSet;

fn sample_model(path: &str) -> Model {
    let name = path.rsplit('.').next().unwrap_or(path).to_string();
    Model {
        path: path.to_string(),
        name,
        file_path: PathBuf::from(format!("/proj/models/{}.sql", path.replace('.', "/"))),
        raw_sql: "select 1 as id".to_string(),
        config: ModelConfig::default(),
        sources: BTreeSet::new(),
        lineage: Vec::new(),
        has_wildcard: false,
    }
}

#[test]
fn test_hashes_round_trip_per_kind() {
    let store = JsonStore::ephemeral();
    store
        .set_hash(ArtifactKind::Model, "staging/a.sql", "abc123")
        .unwrap();
    store
        .set_hash(ArtifactKind::Macro, "helpers.sql", "def456")
        .unwrap();

    assert_eq!(
        store
            .get_hash(ArtifactKind::Model, "staging/a.sql")
            .unwrap(),
        Some("abc123".to_string())
    );
    assert_eq!(
        store.get_hash(ArtifactKind::Macro, "staging/a.sql").unwrap(),
        None
    );

    let models = store.list_hashes(ArtifactKind::Model).unwrap();
    assert_eq!(
        models,
        vec![("staging/a.sql".to_string(), "abc123".to_string())]
    );

    store
        .delete_hash(ArtifactKind::Model, "staging/a.sql")
        .unwrap();
    assert!(store.list_hashes(ArtifactKind::Model).unwrap().is_empty());
}

#[test]
fn test_upsert_model_keeps_id() {
    let store = JsonStore::ephemeral();
    let first = store.upsert_model(&sample_model("staging.a")).unwrap();

    let mut updated = sample_model("staging.a");
    updated.raw_sql = "select 2 as id".to_string();
    let second = store.upsert_model(&updated).unwrap();

    assert_eq!(first.id, second.id);
    let fetched = store.get_model("staging.a").unwrap().unwrap();
    assert_eq!(fetched.model.raw_sql, "select 2 as id");
    assert_eq!(store.list_models().unwrap().len(), 1);
}

#[test]
fn test_distinct_models_get_distinct_ids() {
    let store = JsonStore::ephemeral();
    let a = store.upsert_model(&sample_model("a")).unwrap();
    let b = store.upsert_model(&sample_model("b")).unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn test_delete_model_removes_edges() {
    let store = JsonStore::ephemeral();
    let a = store.upsert_model(&sample_model("a")).unwrap();
    let b = store.upsert_model(&sample_model("b")).unwrap();
    store.replace_dependencies(b.id, &[a.id]).unwrap();

    store.delete_model("a").unwrap();
    assert!(store.get_model("a").unwrap().is_none());
    assert!(store.get_dependencies(b.id).unwrap().is_empty());
}

#[test]
fn test_replace_dependencies_sorts_and_dedupes() {
    let store = JsonStore::ephemeral();
    store.replace_dependencies(3, &[2, 1, 2]).unwrap();
    assert_eq!(store.get_dependencies(3).unwrap(), vec![1, 2]);
}

#[test]
fn test_macro_records() {
    let store = JsonStore::ephemeral();
    let functions = vec!["cents_to_dollars".to_string()];
    let rec = store
        .upsert_macro(
            "cents_to_dollars",
            "/proj/macros/cents_to_dollars.sql",
            &functions,
        )
        .unwrap();
    assert_eq!(rec.functions, functions);
    let again = store
        .upsert_macro(
            "cents_to_dollars",
            "/proj/macros/cents_to_dollars.sql",
            &functions,
        )
        .unwrap();
    assert_eq!(rec.id, again.id);

    store.delete_macro("cents_to_dollars").unwrap();
    assert!(store.list_macros().unwrap().is_empty());
}

fn snapshot(model: &str, source: &str, run_id: i64, cols: &[&str]) -> SchemaSnapshot {
    SchemaSnapshot::new(
        model,
        source,
        run_id,
        cols.iter()
            .map(|name| ColumnSnapshot {
                name: name.to_string(),
                data_type: "BIGINT".to_string(),
            })
            .collect(),
    )
}

#[test]
fn test_snapshot_drift_detection() {
    let store = JsonStore::ephemeral();
    store
        .save_snapshot(&snapshot("wide", "src", 1, &["id"]))
        .unwrap();

    let second = snapshot("wide", "src", 2, &["id", "added"]);
    let prior = store.latest_snapshot("wide", "src").unwrap().unwrap();
    assert!(second.differs_from(&prior));

    store.save_snapshot(&second).unwrap();
    let latest = store.latest_snapshot("wide", "src").unwrap().unwrap();
    assert_eq!(latest.columns.len(), 2);
    assert_eq!(latest.run_id, 2);
    assert_eq!(store.list_snapshots("wide").unwrap().len(), 2);
}

#[test]
fn test_snapshot_latest_is_per_source() {
    let store = JsonStore::ephemeral();
    store
        .save_snapshot(&snapshot("wide", "left", 1, &["a"]))
        .unwrap();
    store
        .save_snapshot(&snapshot("wide", "right", 1, &["b"]))
        .unwrap();

    let left = store.latest_snapshot("wide", "left").unwrap().unwrap();
    assert_eq!(left.columns[0].name, "a");
    assert!(store.latest_snapshot("wide", "missing").unwrap().is_none());
}

#[test]
fn test_prune_snapshots_keeps_newest_per_pair() {
    let store = JsonStore::ephemeral();
    for run_id in 1..=8 {
        store
            .save_snapshot(&snapshot("wide", "src", run_id, &["id"]))
            .unwrap();
    }
    store
        .save_snapshot(&snapshot("other", "src", 1, &["id"]))
        .unwrap();

    store.prune_snapshots(5).unwrap();

    let wide = store.list_snapshots("wide").unwrap();
    assert_eq!(wide.len(), 5);
    assert_eq!(wide.first().unwrap().run_id, 4);
    assert_eq!(wide.last().unwrap().run_id, 8);
    // Other pairs are untouched
    assert_eq!(store.list_snapshots("other").unwrap().len(), 1);
}

#[test]
fn test_run_lifecycle() {
    let store = JsonStore::ephemeral();
    let run = store.create_run(&Run::new("dev")).unwrap();
    assert!(run.id > 0);

    let model = store.upsert_model(&sample_model("a")).unwrap();
    let mut mr = store
        .create_model_run(&ModelRun::pending(run.id, model.id))
        .unwrap();
    assert!(mr.id > 0);

    mr.mark_success(10, 5);
    store.update_model_run(&mr).unwrap();

    let mut finished = run.clone();
    finished.status = RunStatus::Completed;
    finished.finished_at = Some(chrono::Utc::now());
    store.update_run(&finished).unwrap();

    let fetched = store.get_run(run.id).unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Completed);

    let model_runs = store.list_model_runs(run.id).unwrap();
    assert_eq!(model_runs.len(), 1);
    assert_eq!(model_runs[0].status, ModelRunStatus::Success);
    assert_eq!(model_runs[0].rows_affected, 10);
}

#[test]
fn test_update_missing_run_errors() {
    let store = JsonStore::ephemeral();
    let mut run = Run::new("dev");
    run.id = 999;
    assert!(matches!(
        store.update_run(&run),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn test_persistence_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("quarry.json");

    {
        let store = JsonStore::open(&path).unwrap();
        let raw = store.upsert_model(&sample_model("staging.raw")).unwrap();
        let a = store.upsert_model(&sample_model("staging.a")).unwrap();
        store
            .set_hash(ArtifactKind::Model, "staging/a.sql", "abc")
            .unwrap();
        store.replace_dependencies(a.id, &[raw.id]).unwrap();
    }

    let reopened = JsonStore::open(&path).unwrap();
    let raw = reopened.get_model("staging.raw").unwrap().unwrap();
    let a = reopened.get_model("staging.a").unwrap().unwrap();
    assert_eq!(
        reopened
            .get_hash(ArtifactKind::Model, "staging/a.sql")
            .unwrap(),
        Some("abc".to_string())
    );
    assert_eq!(reopened.get_dependencies(a.id).unwrap(), vec![raw.id]);

    // IDs keep advancing from where the file left off
    let next = reopened.upsert_model(&sample_model("staging.b")).unwrap();
    assert!(next.id > a.id);
}
