//! Seed loading
//!
//! Seeds are CSV files loaded into tables named after the file stem.
//! Loading is hash-gated like discovery: an unchanged seed file is not
//! reloaded, but its table name is still registered so discovery's seed
//! validation knows the table is present.

use crate::discovery::{collect_files, DiscoveryIssue};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use qy_core::{content_hash, ArtifactKind};

/// Summary of one seed pass
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    /// Seed files loaded because they were new or changed
    pub loaded: usize,

    /// Seed files skipped because their hash matched
    pub unchanged: usize,

    /// Seed records removed because their file is gone
    pub deleted: usize,

    /// Seed files that failed to load; the pass continues past them
    pub issues: Vec<DiscoveryIssue>,
}

impl Engine {
    /// Load new and changed seed CSVs into the database
    pub async fn load_seeds(&mut self) -> EngineResult<SeedReport> {
        let mut report = SeedReport::default();
        let seeds_dir = self.config.seeds_dir();

        for path in collect_files(&seeds_dir, "csv")? {
            let bytes = std::fs::read(&path).map_err(|e| EngineError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let table = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let key = path
                .strip_prefix(&seeds_dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            let hash = content_hash(&bytes);

            self.seed_tables.insert(table.clone());

            if self.store.get_hash(ArtifactKind::Seed, &key)?.as_deref() == Some(hash.as_str()) {
                report.unchanged += 1;
                continue;
            }

            // One bad CSV does not stop the rest; its hash stays stale
            // so the next pass retries it.
            match self.db.load_csv(&table, &path.display().to_string()).await {
                Ok(()) => {
                    self.store.set_hash(ArtifactKind::Seed, &key, &hash)?;
                    report.loaded += 1;
                    log::info!("loaded seed '{}' from {}", table, key);
                }
                Err(e) => {
                    log::warn!("failed to load seed '{}': {}", table, e);
                    report.issues.push(DiscoveryIssue {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        for (key, _) in self.store.list_hashes(ArtifactKind::Seed)? {
            let path = seeds_dir.join(&key);
            if path.exists() {
                continue;
            }
            self.store.delete_hash(ArtifactKind::Seed, &key)?;
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                self.seed_tables.remove(stem);
            }
            report.deleted += 1;
            log::debug!("seed file {} deleted; table left in place", key);
        }

        Ok(report)
    }
}
