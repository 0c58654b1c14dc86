//! Incremental discovery
//!
//! Discovery walks the project's macro and model directories, re-parses
//! only files whose content hash changed since the last pass, sweeps out
//! records for deleted files, then rebuilds the dependency graph from the
//! store. It touches the filesystem and the store, never the database.

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use qy_core::{content_hash, ArtifactKind, Model};
use qy_render::RenderContext;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Knobs for one discovery pass
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Reparse every file regardless of its stored content hash
    pub force_full_refresh: bool,
}

/// One file discovery could not process
#[derive(Debug, Clone)]
pub struct DiscoveryIssue {
    /// Path of the offending file
    pub path: PathBuf,

    /// What went wrong
    pub message: String,
}

/// Summary of one discovery pass
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Model files seen for the first time
    pub models_added: usize,

    /// Model files whose content hash changed
    pub models_changed: usize,

    /// Model files skipped because their hash matched
    pub models_unchanged: usize,

    /// Model records removed because their file is gone
    pub models_deleted: usize,

    /// Macro files registered (changed or not)
    pub macros_registered: usize,

    /// Macro files whose content hash changed
    pub macros_changed: usize,

    /// Macro records removed because their file is gone
    pub macros_deleted: usize,

    /// External source references backed by a seed file
    pub seeds_validated: Vec<String>,

    /// External source references with no matching seed file
    pub seeds_missing: Vec<String>,

    /// Files that failed to parse; discovery continues past them
    pub issues: Vec<DiscoveryIssue>,

    /// Wall-clock duration of the pass in milliseconds
    pub duration_ms: u64,
}

impl DiscoveryReport {
    /// Model files actually parsed this pass
    pub fn models_parsed(&self) -> usize {
        self.models_added + self.models_changed
    }
}

/// Collect files with an extension under a directory, recursively, sorted.
///
/// A missing directory is an empty project area, not an error.
pub(crate) fn collect_files(dir: &Path, extension: &str) -> EngineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    collect_into(dir, extension, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_into(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> EngineResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_into(&path, extension, files)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            files.push(path);
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> EngineResult<String> {
    std::fs::read_to_string(path).map_err(|e| EngineError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Names defined by `{% macro name(...) %}` blocks in a macro source
fn macro_functions(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for block in source.split("{%") {
        let block = block.trim_start_matches('-').trim_start();
        let Some(rest) = block.strip_prefix("macro") else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let name: String = rest
            .trim_start()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if !name.is_empty() {
            names.push(name);
        }
    }
    names
}

impl Engine {
    /// Run one discovery pass and rebuild the graph.
    ///
    /// Macros are processed first so a changed macro is in effect when
    /// models render. Per-file parse failures are collected into the
    /// report; a dependency cycle fails the whole pass.
    pub fn discover(&mut self) -> EngineResult<DiscoveryReport> {
        self.discover_with(&DiscoveryOptions::default())
    }

    /// Discovery with explicit options
    pub fn discover_with(&mut self, options: &DiscoveryOptions) -> EngineResult<DiscoveryReport> {
        let started = Instant::now();
        let mut report = DiscoveryReport::default();

        self.discover_macros(&mut report, options)?;
        self.discover_models(&mut report, options)?;
        self.sweep_deleted(&mut report)?;
        self.rebuild_graph()?;
        self.validate_seeds(&mut report);

        report.duration_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "discovery: {} parsed, {} unchanged, {} deleted, {} macros ({} changed), {} issues, {}ms",
            report.models_parsed(),
            report.models_unchanged,
            report.models_deleted,
            report.macros_registered,
            report.macros_changed,
            report.issues.len(),
            report.duration_ms
        );
        Ok(report)
    }

    fn discover_macros(
        &mut self,
        report: &mut DiscoveryReport,
        options: &DiscoveryOptions,
    ) -> EngineResult<()> {
        let macros_dir = self.config.macros_dir();
        for path in collect_files(&macros_dir, "sql")? {
            let source = read_file(&path)?;
            let name = file_stem(&path);
            let key = relative_key(&macros_dir, &path);
            let hash = content_hash(source.as_bytes());

            // A macro file must compile as a template here, where it is
            // one reportable issue, instead of failing every model that
            // renders against it.
            let functions = match self.check_macro(&name, &source) {
                Ok(functions) => functions,
                Err(message) => {
                    log::warn!("invalid macro file {}: {}", path.display(), message);
                    report.issues.push(DiscoveryIssue { path, message });
                    continue;
                }
            };

            // The renderer starts every session empty, so unchanged
            // macros are registered too.
            self.renderer.register_macro(&name, &source);
            report.macros_registered += 1;

            let unchanged = !options.force_full_refresh
                && self.store.get_hash(ArtifactKind::Macro, &key)?.as_deref()
                    == Some(hash.as_str());
            if !unchanged {
                self.store
                    .upsert_macro(&name, &path.display().to_string(), &functions)?;
                self.store.set_hash(ArtifactKind::Macro, &key, &hash)?;
                report.macros_changed += 1;
                log::debug!("macro '{}' changed", name);
            }
        }
        Ok(())
    }

    /// Compile-check a macro file and list the functions it defines
    fn check_macro(&self, name: &str, source: &str) -> Result<Vec<String>, String> {
        let ctx = RenderContext {
            model_name: name,
            target_relation: name,
        };
        self.renderer.render(source, &ctx).map_err(|e| e.to_string())?;
        let functions = macro_functions(source);
        if functions.is_empty() {
            return Err("no macro definitions found".to_string());
        }
        Ok(functions)
    }

    fn discover_models(
        &mut self,
        report: &mut DiscoveryReport,
        options: &DiscoveryOptions,
    ) -> EngineResult<()> {
        let models_dir = self.config.models_dir();
        for path in collect_files(&models_dir, "sql")? {
            let raw = read_file(&path)?;
            let key = relative_key(&models_dir, &path);
            let hash = content_hash(raw.as_bytes());

            let previous = self.store.get_hash(ArtifactKind::Model, &key)?;
            if !options.force_full_refresh && previous.as_deref() == Some(hash.as_str()) {
                report.models_unchanged += 1;
                continue;
            }

            match self
                .parser
                .parse(self.renderer.as_ref(), &models_dir, &path, &raw)
            {
                Ok(model) => {
                    self.store.upsert_model(&model)?;
                    self.store.set_hash(ArtifactKind::Model, &key, &hash)?;
                    if previous.is_none() {
                        report.models_added += 1;
                    } else {
                        report.models_changed += 1;
                    }
                }
                Err(e) => {
                    // Leave the old hash in place so the file is retried
                    // on the next pass.
                    log::warn!("failed to parse {}: {}", path.display(), e);
                    report.issues.push(DiscoveryIssue {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Drop records whose source files no longer exist
    fn sweep_deleted(&mut self, report: &mut DiscoveryReport) -> EngineResult<()> {
        let models_dir = self.config.models_dir();
        for (key, _) in self.store.list_hashes(ArtifactKind::Model)? {
            let path = models_dir.join(&key);
            if path.exists() {
                continue;
            }
            self.store.delete_hash(ArtifactKind::Model, &key)?;
            if let Ok(logical) = Model::logical_path(&models_dir, &path) {
                self.store.delete_model(&logical)?;
            }
            report.models_deleted += 1;
            log::debug!("model file {} deleted", key);
        }

        let macros_dir = self.config.macros_dir();
        for (key, _) in self.store.list_hashes(ArtifactKind::Macro)? {
            let path = macros_dir.join(&key);
            if path.exists() {
                continue;
            }
            self.store.delete_hash(ArtifactKind::Macro, &key)?;
            let name = file_stem(&path);
            self.store.delete_macro(&name)?;
            self.renderer.remove_macro(&name);
            report.macros_deleted += 1;
        }
        Ok(())
    }

    /// Check that every external source reference is backed by a seed.
    ///
    /// A table the seed loader registered counts even if its CSV has
    /// since been deleted: the table is still in the database. Otherwise
    /// existence of `seeds/<name>.csv` is checked; nothing is loaded. A
    /// missing seed is reported, not fatal, since the relation may exist
    /// in the database already.
    fn validate_seeds(&self, report: &mut DiscoveryReport) {
        let seeds_dir = self.config.seeds_dir();
        let mut externals: BTreeSet<String> = BTreeSet::new();
        for model in self.models.values() {
            for source in &model.sources {
                if self.resolve_source(source).is_none() {
                    externals.insert(source.clone());
                }
            }
        }

        for source in externals {
            if self.seed_tables.contains(&source)
                || seeds_dir.join(format!("{}.csv", source)).exists()
            {
                report.seeds_validated.push(source);
            } else {
                log::debug!("no seed file for external source '{}'", source);
                report.seeds_missing.push(source);
            }
        }
    }
}
