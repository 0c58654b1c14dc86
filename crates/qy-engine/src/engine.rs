//! Engine wiring
//!
//! The [`Engine`] owns the collaborators (database, state store, renderer,
//! parser) plus the in-memory model registry and dependency graph that
//! discovery rebuilds. Runs consume the graph; they never re-read the
//! filesystem.

use crate::error::{EngineError, EngineResult};
use crate::parser::{ModelParser, SqlModelParser};
use qy_core::{CoreError, Graph, Model};
use qy_db::Database;
use qy_render::{JinjaRenderer, SqlRenderer};
use qy_store::StateStore;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Project layout and run settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Project root containing `models/`, `macros/`, and `seeds/`
    pub project_dir: PathBuf,

    /// Environment label recorded on runs
    pub environment: String,
}

impl EngineConfig {
    pub fn new(project_dir: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            environment: environment.into(),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.project_dir.join("models")
    }

    pub fn macros_dir(&self) -> PathBuf {
        self.project_dir.join("macros")
    }

    pub fn seeds_dir(&self) -> PathBuf {
        self.project_dir.join("seeds")
    }
}

/// The transformation engine
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) db: Arc<dyn Database>,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) renderer: Box<dyn SqlRenderer>,
    pub(crate) parser: Box<dyn ModelParser>,
    pub(crate) graph: Graph<()>,
    pub(crate) models: BTreeMap<String, Model>,
    pub(crate) seed_tables: BTreeSet<String>,
}

impl Engine {
    /// Create an engine with the default renderer and parser
    pub fn new(config: EngineConfig, db: Arc<dyn Database>, store: Arc<dyn StateStore>) -> Self {
        Self::with_components(
            config,
            db,
            store,
            Box::new(JinjaRenderer::new()),
            Box::new(SqlModelParser::new()),
        )
    }

    /// Create an engine with explicit renderer and parser implementations
    pub fn with_components(
        config: EngineConfig,
        db: Arc<dyn Database>,
        store: Arc<dyn StateStore>,
        renderer: Box<dyn SqlRenderer>,
        parser: Box<dyn ModelParser>,
    ) -> Self {
        Self {
            config,
            db,
            store,
            renderer,
            parser,
            graph: Graph::new(),
            models: BTreeMap::new(),
            seed_tables: BTreeSet::new(),
        }
    }

    /// The current dependency graph
    pub fn graph(&self) -> &Graph<()> {
        &self.graph
    }

    /// Look up a discovered model by logical path
    pub fn model(&self, path: &str) -> Option<&Model> {
        self.models.get(path)
    }

    /// Logical paths of all discovered models, sorted
    pub fn model_paths(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Resolve a source reference to the model that owns it, if any.
    ///
    /// Matches the logical path first, then bare name or target
    /// relation. A miss means the reference is an external relation.
    pub(crate) fn resolve_source(&self, source: &str) -> Option<&Model> {
        if let Some(model) = self.models.get(source) {
            return Some(model);
        }
        self.models
            .values()
            .find(|m| m.name == source || m.target_relation() == source)
    }

    /// Rebuild the registry and graph from the store's current model set.
    ///
    /// A source reference resolves to a model when it matches the model's
    /// logical path, bare name, or target relation; an exact path match
    /// takes precedence over another model's bare name. Anything else is
    /// an external table and contributes no edge. Fails when the resulting
    /// graph has a cycle, before any dependency records are written.
    pub(crate) fn rebuild_graph(&mut self) -> EngineResult<()> {
        self.models.clear();
        self.graph.clear();

        let mut ids: BTreeMap<String, i64> = BTreeMap::new();
        for stored in self.store.list_models()? {
            let path = stored.model.path.clone();
            ids.insert(path.clone(), stored.id);
            self.models.insert(path, stored.model);
        }

        // Exact logical paths always win; bare names and target relations
        // only claim keys no path owns.
        let mut resolver: BTreeMap<String, String> = BTreeMap::new();
        for path in self.models.keys() {
            resolver.insert(path.clone(), path.clone());
        }
        for (path, model) in &self.models {
            for candidate in [model.name.clone(), model.target_relation()] {
                if let Some(existing) = resolver.get(&candidate) {
                    if existing != path {
                        log::debug!(
                            "source name '{}' is ambiguous between '{}' and '{}'",
                            candidate,
                            existing,
                            path
                        );
                    }
                    continue;
                }
                resolver.insert(candidate, path.clone());
            }
        }

        for path in self.model_paths() {
            self.graph.add_node(path, ());
        }

        let mut edges: Vec<(String, String)> = Vec::new();
        for (path, model) in &self.models {
            for source in &model.sources {
                let Some(parent) = resolver.get(source) else {
                    continue;
                };
                if parent == path {
                    continue;
                }
                edges.push((parent.clone(), path.clone()));
            }
        }
        for (parent, child) in edges {
            self.graph.add_edge(&parent, &child)?;
        }

        if let Some(cycle) = self.graph.find_cycle() {
            return Err(EngineError::Core(CoreError::CyclicGraph {
                cycle: cycle.join(" -> "),
            }));
        }

        for path in self.model_paths() {
            let Some(&model_id) = ids.get(&path) else {
                continue;
            };
            let parent_ids: Vec<i64> = self
                .graph
                .parents(&path)
                .iter()
                .filter_map(|p| ids.get(p).copied())
                .collect();
            self.store.replace_dependencies(model_id, &parent_ids)?;
        }

        Ok(())
    }
}
