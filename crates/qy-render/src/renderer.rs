//! SQL template renderer
//!
//! Each render builds a fresh minijinja environment so per-model state
//! (`this`, `is_incremental()`) never leaks between models. Registered
//! macros are prepended to every template as a prelude, which is how a
//! macro edit takes effect on the next render without any caching layer.

use crate::error::RenderResult;
use crate::functions::{
    make_config_fn, make_env_fn, make_error_fn, make_is_incremental_fn, make_var_fn,
    minijinja_value_to_json, yaml_to_json, ConfigCapture,
};
use minijinja::{Environment, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Per-model context for one render
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// Model name, for error messages
    pub model_name: &'a str,

    /// Relation `{{ this }}` resolves to
    pub target_relation: &'a str,
}

/// Result of rendering one model template
#[derive(Debug, Clone)]
pub struct Rendered {
    /// SQL for a full build (`is_incremental()` rendered as false)
    pub sql: String,

    /// SQL for an incremental build, present only when the template
    /// actually branches on `is_incremental()`
    pub incremental_sql: Option<String>,

    /// Config values captured from the template's `config()` call
    pub config: HashMap<String, serde_json::Value>,
}

/// Renders model templates to executable SQL
pub trait SqlRenderer: Send + Sync {
    /// Render a model template in both incremental modes
    fn render(&self, template: &str, ctx: &RenderContext) -> RenderResult<Rendered>;

    /// Register a macro source under a name, replacing any previous version
    fn register_macro(&mut self, name: &str, source: &str);

    /// Remove a macro by name
    fn remove_macro(&mut self, name: &str);

    /// Names of currently registered macros, sorted
    fn macro_names(&self) -> Vec<String>;
}

/// Jinja-based renderer with project variables and a macro registry
pub struct JinjaRenderer {
    vars: HashMap<String, serde_json::Value>,
    macros: BTreeMap<String, String>,
}

impl JinjaRenderer {
    /// Create a renderer with no variables or macros
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
            macros: BTreeMap::new(),
        }
    }

    /// Create a renderer with project variables from YAML config
    pub fn with_vars(vars: &HashMap<String, serde_yaml::Value>) -> Self {
        Self {
            vars: vars
                .iter()
                .map(|(k, v)| (k.clone(), yaml_to_json(v)))
                .collect(),
            macros: BTreeMap::new(),
        }
    }

    /// Render once with a fixed is_incremental() answer
    fn render_once(
        &self,
        template: &str,
        ctx: &RenderContext,
        is_incremental: bool,
    ) -> RenderResult<(String, HashMap<String, Value>)> {
        let mut env = Environment::new();
        let config_capture: ConfigCapture = Arc::new(Mutex::new(HashMap::new()));

        env.add_function("config", make_config_fn(config_capture.clone()));
        env.add_function("var", make_var_fn(self.vars.clone()));
        env.add_function("is_incremental", make_is_incremental_fn(is_incremental));
        env.add_function("env", make_env_fn());
        env.add_function("error", make_error_fn());
        env.add_global("this", Value::from(ctx.target_relation));

        let full = if self.macros.is_empty() {
            template.to_string()
        } else {
            let mut prelude: String = self.macros.values().cloned().collect::<Vec<_>>().join("\n");
            prelude.push('\n');
            prelude.push_str(template);
            prelude
        };

        let rendered = env.render_str(&full, ())?;
        let captured = config_capture
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        Ok((rendered.trim().to_string(), captured))
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlRenderer for JinjaRenderer {
    fn render(&self, template: &str, ctx: &RenderContext) -> RenderResult<Rendered> {
        let (sql, captured) = self.render_once(template, ctx, false)?;

        let is_incremental_model = captured
            .get("materialized")
            .and_then(|v| v.as_str())
            .map(|s| s == "incremental")
            .unwrap_or(false);

        let incremental_sql = if is_incremental_model {
            let (inc, _) = self.render_once(template, ctx, true)?;
            if inc != sql {
                Some(inc)
            } else {
                None
            }
        } else {
            None
        };

        log::debug!(
            "rendered model '{}' ({} chars{})",
            ctx.model_name,
            sql.len(),
            if incremental_sql.is_some() {
                ", incremental variant"
            } else {
                ""
            }
        );

        Ok(Rendered {
            sql,
            incremental_sql,
            config: captured
                .iter()
                .map(|(k, v)| (k.clone(), minijinja_value_to_json(v)))
                .collect(),
        })
    }

    fn register_macro(&mut self, name: &str, source: &str) {
        self.macros.insert(name.to_string(), source.to_string());
    }

    fn remove_macro(&mut self, name: &str) {
        self.macros.remove(name);
    }

    fn macro_names(&self) -> Vec<String> {
        self.macros.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "renderer_test.rs"]
mod tests;
