//! Source-control collaborator backed by the `git` CLI

use std::path::Path;
use std::process::Command;

use tracing::debug;

use super::ChangeAction;

/// A path reported changed by source control, relative to the scan root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsChange {
    pub path: String,
    pub action: ChangeAction,
}

/// What the change detector needs from version control. `None` means
/// "not a repository" or "cannot answer"; callers fall back to hashing.
pub trait SourceControl {
    fn head_commit(&self, root: &Path) -> Option<String>;
    fn changed_since(&self, root: &Path, commit: &str) -> Option<Vec<VcsChange>>;
}

/// Shells out to `git -C <root>`
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    fn run(root: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new("git").arg("-C").arg(root).args(args).output().ok()?;
        if !output.status.success() {
            debug!(
                args = ?args,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git command failed"
            );
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SourceControl for GitCli {
    fn head_commit(&self, root: &Path) -> Option<String> {
        let out = Self::run(root, &["rev-parse", "HEAD"])?;
        let sha = out.trim();
        if sha.is_empty() {
            None
        } else {
            Some(sha.to_string())
        }
    }

    fn changed_since(&self, root: &Path, commit: &str) -> Option<Vec<VcsChange>> {
        // working tree against the commit, so uncommitted edits count too
        let diff = Self::run(root, &["diff", "--name-status", "--no-renames", "--relative", commit])?;
        let untracked = Self::run(root, &["ls-files", "--others", "--exclude-standard"])?;

        let mut changes = parse_name_status(&diff);
        changes.extend(untracked.lines().filter(|l| !l.trim().is_empty()).map(|line| VcsChange {
            path: line.trim().to_string(),
            action: ChangeAction::Added,
        }));
        Some(changes)
    }
}

/// Parse `git diff --name-status` output
pub fn parse_name_status(output: &str) -> Vec<VcsChange> {
    output
        .lines()
        .filter_map(|line| {
            let (status, path) = line.split_once('\t')?;
            let action = match status.chars().next()? {
                'A' => ChangeAction::Added,
                'D' => ChangeAction::Deleted,
                'M' | 'T' => ChangeAction::Modified,
                _ => return None,
            };
            Some(VcsChange {
                path: path.trim().to_string(),
                action,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_status() {
        let out = "M\tsrc/lib.rs\nA\tsrc/new.rs\nD\told.py\nT\tlink\nU\tconflicted.rs\n\n";
        let changes = parse_name_status(out);
        assert_eq!(
            changes,
            vec![
                VcsChange { path: "src/lib.rs".into(), action: ChangeAction::Modified },
                VcsChange { path: "src/new.rs".into(), action: ChangeAction::Added },
                VcsChange { path: "old.py".into(), action: ChangeAction::Deleted },
                VcsChange { path: "link".into(), action: ChangeAction::Modified },
            ]
        );
    }

    #[test]
    fn test_not_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitCli.head_commit(dir.path()).is_none());
        assert!(GitCli.changed_since(dir.path(), "HEAD").is_none());
    }
}
