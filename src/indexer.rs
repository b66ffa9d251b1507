//! Full and incremental index builds
//!
//! An [`Indexer`] wires the collaborators together: a [`FileLister`] to
//! enumerate the tree, an [`AnalyzerFactory`] for per-language facts and a
//! [`SourceControl`] for commit provenance and cheap change detection.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::changes::{
    apply_changes, detect_with_source_control, ChangeSet, ChangeSummary, GitCli, SourceControl,
};
use crate::config::IndexConfig;
use crate::db::{Database, FileCounts};
use crate::error::PalaceError;
use crate::extraction::{AnalyzerFactory, TreeSitterFactory};
use crate::scanner::{aggregate_hash, scan_files, FileLister, ListedFile, WalkLister};
use crate::types::{unix_now, ScanSummary};

pub struct Indexer {
    config: IndexConfig,
    lister: Box<dyn FileLister>,
    factory: Box<dyn AnalyzerFactory>,
    source_control: Box<dyn SourceControl>,
}

impl Indexer {
    pub fn new(config: IndexConfig) -> Self {
        let lister = Box::new(WalkLister::new(&config));
        Self {
            config,
            lister,
            factory: Box::new(TreeSitterFactory),
            source_control: Box::new(GitCli),
        }
    }

    pub fn with_lister(mut self, lister: Box<dyn FileLister>) -> Self {
        self.lister = lister;
        self
    }

    pub fn with_analyzer_factory(mut self, factory: Box<dyn AnalyzerFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_source_control(mut self, source_control: Box<dyn SourceControl>) -> Self {
        self.source_control = source_control;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn list(&self) -> Result<Vec<ListedFile>> {
        let root = &self.config.root;
        if !root.is_dir() {
            return Err(PalaceError::RootNotFound(root.clone()).into());
        }
        self.lister.list(root)
    }

    /// Clear the index and rebuild it from disk in one transaction, then
    /// record the scan and write its JSON summary.
    pub fn full_scan(&self, db: &mut Database) -> Result<ScanSummary> {
        let started_at = unix_now();
        info!("Indexing {}", self.config.root.display());

        let files = self.list()?;
        let scanned = scan_files(&files, &self.config, self.factory.as_ref())?;
        let commit_hash = self.source_control.head_commit(&self.config.root);
        let scan_hash = aggregate_hash(scanned.iter().map(|f| (f.path.as_str(), f.hash.as_str())));

        let indexed_at = unix_now();
        let summary = db.write(|w| {
            w.clear_all()?;
            let mut counts = FileCounts::default();
            for file in &scanned {
                let c = w.insert_scanned_file(file, indexed_at)?;
                counts.chunks += c.chunks;
                counts.symbols += c.symbols;
                counts.relationships += c.relationships;
            }
            w.resolve_import_targets()?;

            let mut summary = ScanSummary {
                id: 0,
                root_path: self.config.root.display().to_string(),
                scan_hash,
                commit_hash,
                started_at,
                completed_at: unix_now(),
                file_count: scanned.len() as u64,
                chunk_count: counts.chunks,
                symbol_count: counts.symbols,
                relationship_count: counts.relationships,
            };
            summary.id = w.insert_scan(&summary)?;
            Ok(summary)
        })?;

        if let Err(e) = write_summary(&self.config.summary_path(), &summary) {
            warn!("Failed to write scan summary: {:#}", e);
        }

        info!(
            "Indexed {} files, {} chunks, {} symbols, {} relationships",
            summary.file_count, summary.chunk_count, summary.symbol_count, summary.relationship_count
        );
        Ok(summary)
    }

    /// Changes between disk and the index, without applying them
    pub fn detect_changes(&self, db: &Database) -> Result<ChangeSet> {
        let files = self.list()?;
        detect_with_source_control(db, &self.config.root, &files, self.source_control.as_ref())
    }

    /// Re-index only what changed. Falls back to a full scan on an empty index.
    pub fn incremental(&self, db: &mut Database) -> Result<ChangeSummary> {
        if db.latest_scan()?.is_none() && db.file_count()? == 0 {
            info!("Index is empty; running a full scan");
            let scan = self.full_scan(db)?;
            return Ok(ChangeSummary {
                added: scan.file_count,
                chunks: scan.chunk_count,
                symbols: scan.symbol_count,
                relationships: scan.relationship_count,
                ..ChangeSummary::default()
            });
        }

        let files = self.list()?;
        let changes =
            detect_with_source_control(db, &self.config.root, &files, self.source_control.as_ref())?;
        if changes.is_empty() {
            let unchanged = db.file_count()?;
            info!("Index is up to date ({} files)", unchanged);
            return Ok(ChangeSummary {
                unchanged,
                ..ChangeSummary::default()
            });
        }
        apply_changes(db, &self.config, &files, &changes, self.factory.as_ref())
    }
}

fn write_summary(path: &Path, summary: &ScanSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeAction, VcsChange};

    struct NoVcs;

    impl SourceControl for NoVcs {
        fn head_commit(&self, _: &Path) -> Option<String> {
            None
        }

        fn changed_since(&self, _: &Path, _: &str) -> Option<Vec<VcsChange>> {
            None
        }
    }

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/main.rs"),
            "mod util;\n\nfn main() {\n    util::helper();\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join("src/util.rs"), "pub fn helper() {}\n").unwrap();
        dir
    }

    fn indexer(root: &Path) -> Indexer {
        Indexer::new(IndexConfig::new(root).with_workers(1)).with_source_control(Box::new(NoVcs))
    }

    #[test]
    fn test_full_scan_records_summary() {
        let dir = workspace();
        let mut db = Database::in_memory().unwrap();
        let summary = indexer(dir.path()).full_scan(&mut db).unwrap();

        assert_eq!(summary.file_count, 2);
        assert!(summary.symbol_count >= 2);
        assert_eq!(summary.commit_hash, None);
        assert_eq!(db.latest_scan().unwrap(), Some(summary.clone()));

        let written = fs::read_to_string(dir.path().join(".palace/outputs/scan-summary.json")).unwrap();
        let parsed: ScanSummary = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, summary);
    }

    #[test]
    fn test_full_scan_is_a_rewrite() {
        let dir = workspace();
        let mut db = Database::in_memory().unwrap();
        let idx = indexer(dir.path());
        idx.full_scan(&mut db).unwrap();
        fs::remove_file(dir.path().join("src/util.rs")).unwrap();
        let second = idx.full_scan(&mut db).unwrap();

        assert_eq!(second.file_count, 1);
        assert_eq!(db.file_count().unwrap(), 1);
        assert!(db.symbols_named("helper", true).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::in_memory().unwrap();
        let err = indexer(&dir.path().join("nope")).full_scan(&mut db).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PalaceError>(),
            Some(PalaceError::RootNotFound(_))
        ));
    }

    #[test]
    fn test_incremental_on_empty_index_scans_everything() {
        let dir = workspace();
        let mut db = Database::in_memory().unwrap();
        let summary = indexer(dir.path()).incremental(&mut db).unwrap();
        assert_eq!(summary.added, 2);
        assert!(db.latest_scan().unwrap().is_some());
    }

    #[test]
    fn test_incremental_applies_changes() {
        let dir = workspace();
        let mut db = Database::in_memory().unwrap();
        let idx = indexer(dir.path());
        idx.full_scan(&mut db).unwrap();

        let unchanged = idx.incremental(&mut db).unwrap();
        assert_eq!(unchanged.unchanged, 2);
        assert_eq!(unchanged.modified, 0);

        fs::write(dir.path().join("src/util.rs"), "pub fn helper() {}\npub fn extra() {}\n").unwrap();
        let set = idx.detect_changes(&db).unwrap();
        assert_eq!(set.count(ChangeAction::Modified), 1);

        let summary = idx.incremental(&mut db).unwrap();
        assert_eq!((summary.added, summary.modified, summary.deleted, summary.unchanged), (0, 1, 0, 1));
        assert_eq!(db.symbols_named("extra", true).unwrap().len(), 1);
    }
}
