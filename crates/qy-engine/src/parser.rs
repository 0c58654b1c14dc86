//! Model file parsing
//!
//! Turns a raw model file into a [`Model`]: render the template to SQL,
//! capture its config() block, then analyze the SQL for source tables,
//! output columns, and wildcard projections.

use crate::error::{EngineError, EngineResult};
use qy_core::{ColumnLineage, CoreError, Materialization, Model, ModelConfig};
use qy_render::{RenderContext, SqlRenderer};
use qy_sql::{analyze_statement, QueryAnalysis, SqlParser};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Parses one model file into a [`Model`]
pub trait ModelParser: Send + Sync {
    fn parse(
        &self,
        renderer: &dyn SqlRenderer,
        models_root: &Path,
        file_path: &Path,
        raw_sql: &str,
    ) -> EngineResult<Model>;
}

/// Default parser: Jinja render followed by AST analysis
pub struct SqlModelParser {
    sql: SqlParser,
}

impl SqlModelParser {
    pub fn new() -> Self {
        Self {
            sql: SqlParser::new(),
        }
    }
}

impl Default for SqlModelParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelParser for SqlModelParser {
    fn parse(
        &self,
        renderer: &dyn SqlRenderer,
        models_root: &Path,
        file_path: &Path,
        raw_sql: &str,
    ) -> EngineResult<Model> {
        let path = Model::logical_path(models_root, file_path)?;
        let name = Model::display_name(file_path)?;

        if raw_sql.trim().is_empty() {
            return Err(CoreError::EmptyModel { name }.into());
        }

        // At parse time the target schema is not yet known, so `this`
        // resolves to the bare model name. Incremental self-references
        // are filtered out of the source set below either way.
        let ctx = RenderContext {
            model_name: &name,
            target_relation: &name,
        };
        let rendered = renderer.render(raw_sql, &ctx)?;
        let config = config_from_captured(&path, &rendered.config)?;

        let stmt = self.sql.parse_single(&rendered.sql)?;
        let analysis = analyze_statement(&stmt);

        let mut sources: BTreeSet<String> = analysis.sources.iter().cloned().collect();
        if let Some(inc_sql) = &rendered.incremental_sql {
            let inc_stmt = self.sql.parse_single(inc_sql)?;
            sources.extend(analyze_statement(&inc_stmt).sources);
        }

        // A model never depends on itself; incremental templates read
        // their own target through {{ this }}.
        let target = match &config.schema {
            Some(schema) => format!("{}.{}", schema, name),
            None => name.clone(),
        };
        sources.remove(&path);
        sources.remove(&name);
        sources.remove(&target);

        Ok(Model {
            path,
            name,
            file_path: file_path.to_path_buf(),
            raw_sql: raw_sql.to_string(),
            config,
            sources,
            lineage: lineage_from_analysis(&analysis),
            has_wildcard: analysis.has_wildcard,
        })
    }
}

fn config_from_captured(
    model_path: &str,
    captured: &HashMap<String, serde_json::Value>,
) -> EngineResult<ModelConfig> {
    let mut config = ModelConfig::default();

    for (key, value) in captured {
        match key.as_str() {
            "materialized" => {
                let raw = value.as_str().unwrap_or_default();
                config.materialized =
                    Materialization::parse(raw).ok_or_else(|| EngineError::InvalidConfig {
                        model: model_path.to_string(),
                        key: key.clone(),
                        value: value.to_string(),
                    })?;
            }
            "unique_key" => {
                config.unique_key = value.as_str().map(str::to_string);
            }
            "schema" => {
                config.schema = value.as_str().map(str::to_string);
            }
            "tags" => {
                config.tags = value
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
            }
            "owner" => {
                config.owner = value.as_str().map(str::to_string);
            }
            other => {
                let text = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                config.meta.insert(other.to_string(), text);
            }
        }
    }

    Ok(config)
}

fn lineage_from_analysis(analysis: &QueryAnalysis) -> Vec<ColumnLineage> {
    analysis
        .columns
        .iter()
        .map(|c| ColumnLineage {
            column: c.name.clone(),
            sources: c.sources.clone(),
        })
        .collect()
}

#[cfg(test)]
#[path = "parser_test.rs"]
mod tests;
