//! Change detection and incremental application
//!
//! Two detectors produce the same [`ChangeSet`]: one compares content hashes
//! against the recorded index, the other asks source control what moved
//! since the last full scan. [`apply_changes`] rewrites only the affected
//! paths, in one transaction.

pub mod git;

pub use git::{GitCli, SourceControl, VcsChange};

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::db::{Database, FileCounts};
use crate::extraction::AnalyzerFactory;
use crate::scanner::{hash_file, scan_files, ListedFile};
use crate::types::unix_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Added,
    Modified,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Added => "added",
            ChangeAction::Modified => "modified",
            ChangeAction::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub action: ChangeAction,
    /// Hash recorded in the index; `None` for added files
    pub old_hash: Option<String>,
    /// Hash on disk; `None` for deleted files
    pub new_hash: Option<String>,
}

/// How a change set was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    ContentHash,
    SourceControl,
}

/// Changes sorted by path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub strategy: DetectionStrategy,
    pub changes: Vec<FileChange>,
}

impl ChangeSet {
    fn new(strategy: DetectionStrategy, mut changes: Vec<FileChange>) -> Self {
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Self { strategy, changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

/// Outcome of applying a change set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: u64,
    pub modified: u64,
    pub deleted: u64,
    /// `files_before - modified - deleted`
    pub unchanged: u64,
    pub chunks: u64,
    pub symbols: u64,
    pub relationships: u64,
    pub resolved_imports: u64,
}

/// Classify every listed file against the recorded hashes.
/// Files that cannot be read are logged and left out of the result.
pub fn detect_by_hash(db: &Database, files: &[ListedFile]) -> Result<ChangeSet> {
    let mut recorded = db.file_hashes()?;
    let mut changes = Vec::new();

    for file in files {
        let hash = match hash_file(&file.abs_path) {
            Ok(h) => h,
            Err(e) => {
                warn!("Skipping unreadable {}: {}", file.path, e);
                recorded.remove(&file.path);
                continue;
            }
        };

        match recorded.remove(&file.path) {
            None => changes.push(FileChange {
                path: file.path.clone(),
                action: ChangeAction::Added,
                old_hash: None,
                new_hash: Some(hash),
            }),
            Some(old) if old != hash => changes.push(FileChange {
                path: file.path.clone(),
                action: ChangeAction::Modified,
                old_hash: Some(old),
                new_hash: Some(hash),
            }),
            Some(_) => {}
        }
    }

    changes.extend(recorded.into_iter().map(|(path, old)| FileChange {
        path,
        action: ChangeAction::Deleted,
        old_hash: Some(old),
        new_hash: None,
    }));

    Ok(ChangeSet::new(DetectionStrategy::ContentHash, changes))
}

/// Ask source control what changed since the commit of the latest scan,
/// falling back to [`detect_by_hash`] when there is no such commit or the
/// root is not a repository.
///
/// Paths rewritten by an incremental run after that scan are re-hashed as
/// well: a file edited and later reverted to its committed content no longer
/// shows up in the diff, but its recorded hash is the edited one.
pub fn detect_with_source_control(
    db: &Database,
    root: &Path,
    files: &[ListedFile],
    source_control: &dyn SourceControl,
) -> Result<ChangeSet> {
    let Some((commit, completed_at)) = db
        .latest_scan()?
        .and_then(|scan| scan.commit_hash.map(|commit| (commit, scan.completed_at)))
    else {
        debug!("no recorded commit; using content hashes");
        return detect_by_hash(db, files);
    };
    let Some(reported) = source_control.changed_since(root, &commit) else {
        debug!(commit = %commit, "source control unavailable; using content hashes");
        return detect_by_hash(db, files);
    };

    let recorded = db.file_hashes()?;
    let listed: HashMap<&str, &ListedFile> = files.iter().map(|f| (f.path.as_str(), f)).collect();

    let mut candidates: BTreeSet<String> = reported.into_iter().map(|c| c.path).collect();
    let touched = db.paths_indexed_since(completed_at)?;
    debug!(
        reported = candidates.len(),
        touched = touched.len(),
        "re-checking paths since last scan"
    );
    candidates.extend(touched);

    let mut changes = Vec::new();
    for path in candidates {
        let old_hash = recorded.get(&path).cloned();
        match listed.get(path.as_str()) {
            Some(file) => {
                let new_hash = match hash_file(&file.abs_path) {
                    Ok(h) => h,
                    Err(e) => {
                        warn!("Skipping unreadable {}: {}", path, e);
                        continue;
                    }
                };
                let action = match &old_hash {
                    None => ChangeAction::Added,
                    Some(old) if *old != new_hash => ChangeAction::Modified,
                    Some(_) => continue,
                };
                changes.push(FileChange {
                    path,
                    action,
                    old_hash,
                    new_hash: Some(new_hash),
                });
            }
            // gone from disk, or now excluded by the lister
            None if old_hash.is_some() => changes.push(FileChange {
                path,
                action: ChangeAction::Deleted,
                old_hash,
                new_hash: None,
            }),
            None => {}
        }
    }

    Ok(ChangeSet::new(DetectionStrategy::SourceControl, changes))
}

/// Rewrite the rows of every changed path in one transaction.
///
/// Added and modified files are scanned before the transaction opens, so a
/// read failure aborts without touching the index.
pub fn apply_changes(
    db: &mut Database,
    config: &IndexConfig,
    files: &[ListedFile],
    changes: &ChangeSet,
    factory: &dyn AnalyzerFactory,
) -> Result<ChangeSummary> {
    let files_before = db.file_count()?;
    let listed: HashMap<&str, &ListedFile> = files.iter().map(|f| (f.path.as_str(), f)).collect();

    let mut to_scan = Vec::new();
    for change in &changes.changes {
        if change.action == ChangeAction::Deleted {
            continue;
        }
        match listed.get(change.path.as_str()) {
            Some(file) => to_scan.push((*file).clone()),
            None => warn!("Changed file {} is not in the listing; skipping", change.path),
        }
    }
    let scanned = scan_files(&to_scan, config, factory)?;

    let indexed_at = unix_now();
    let (counts, resolved_imports) = db.write(|w| {
        for change in &changes.changes {
            w.delete_path(&change.path)?;
        }
        let mut counts = FileCounts::default();
        for file in &scanned {
            let c = w.insert_scanned_file(file, indexed_at)?;
            counts.chunks += c.chunks;
            counts.symbols += c.symbols;
            counts.relationships += c.relationships;
        }
        let resolved = w.resolve_import_targets()?;
        Ok((counts, resolved))
    })?;

    let added = changes.count(ChangeAction::Added) as u64;
    let modified = changes.count(ChangeAction::Modified) as u64;
    let deleted = changes.count(ChangeAction::Deleted) as u64;
    let summary = ChangeSummary {
        added,
        modified,
        deleted,
        unchanged: files_before.saturating_sub(modified + deleted),
        chunks: counts.chunks,
        symbols: counts.symbols,
        relationships: counts.relationships,
        resolved_imports,
    };

    info!(
        "Applied changes: {} added, {} modified, {} deleted, {} unchanged",
        summary.added, summary.modified, summary.deleted, summary.unchanged
    );
    Ok(summary)
}
