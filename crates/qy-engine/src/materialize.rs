//! Materialization strategies
//!
//! Turns rendered SQL into database state. Table and view builds replace
//! the target wholesale; incremental builds upsert through a scratch
//! table so the delete and insert read one consistent result set.

use crate::error::EngineResult;
use qy_core::{Materialization, Model};
use qy_db::Database;
use qy_render::Rendered;

/// Scratch table name for an incremental upsert
fn scratch_table(target: &str) -> String {
    format!("{}__qy_tmp", target)
}

/// Materialize one model, returning the rows affected
pub(crate) async fn materialize(
    db: &dyn Database,
    model: &Model,
    rendered: &Rendered,
) -> EngineResult<usize> {
    let target = model.target_relation();
    if let Some(schema) = &model.config.schema {
        db.create_schema_if_not_exists(schema).await?;
    }

    match model.config.materialized {
        Materialization::View => {
            db.drop_if_exists(&target).await?;
            db.create_view_as(&target, &rendered.sql, false).await?;
            Ok(0)
        }
        Materialization::Table => materialize_table(db, &target, &rendered.sql).await,
        Materialization::Incremental => materialize_incremental(db, model, rendered, &target).await,
    }
}

/// Drop and recreate the target, with a best-effort row count.
///
/// A count failure leaves the table in place, so it is reported as 0
/// rows rather than failing the build.
async fn materialize_table(db: &dyn Database, target: &str, sql: &str) -> EngineResult<usize> {
    db.drop_if_exists(target).await?;
    db.create_table_as(target, sql, false).await?;
    match db.query_count(&format!("SELECT * FROM {}", target)).await {
        Ok(rows) => Ok(rows),
        Err(e) => {
            log::warn!("row count failed for '{}': {}", target, e);
            Ok(0)
        }
    }
}

async fn materialize_incremental(
    db: &dyn Database,
    model: &Model,
    rendered: &Rendered,
    target: &str,
) -> EngineResult<usize> {
    let exists = db.relation_exists(target).await?;

    // First build, or a template with no incremental branch: the full
    // query defines the table.
    let Some(inc_sql) = rendered.incremental_sql.as_deref().filter(|_| exists) else {
        return materialize_table(db, target, &rendered.sql).await;
    };

    match model.config.unique_key.as_deref() {
        Some(key) => {
            let tmp = scratch_table(target);
            db.create_table_as(&tmp, inc_sql, true).await?;
            db.execute(&format!(
                "DELETE FROM {target} WHERE {key} IN (SELECT {key} FROM {tmp})"
            ))
            .await?;
            db.execute(&format!("INSERT INTO {target} SELECT * FROM {tmp}"))
                .await?;
            let rows = db.query_count(&format!("SELECT * FROM {}", tmp)).await?;
            db.drop_if_exists(&tmp).await?;
            Ok(rows)
        }
        None => {
            // No unique key: plain append, no count taken.
            db.execute(&format!("INSERT INTO {target} {inc_sql}"))
                .await?;
            Ok(0)
        }
    }
}
