//! Index configuration
//!
//! Defaults live here; `IndexConfig::from_env` layers `PALACE_*` overrides on top.

use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Glob patterns excluded from every scan unless the caller replaces them
pub const DEFAULT_EXCLUDES: &[&str] = &[
    // VCS / IDE metadata
    ".git/",
    ".hg/",
    ".svn/",
    ".idea/",
    ".vscode/",
    ".palace/",
    ".DS_Store",
    // Vendor / dependency directories
    "node_modules/",
    "vendor/",
    "target/",
    "dist/",
    "build/",
    ".venv/",
    "venv/",
    "__pycache__/",
    // Lockfiles
    "*.lock",
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "go.sum",
    // Generated
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.pb.go",
    "*.generated.*",
    // Tests
    "__tests__/",
    "*_test.go",
    "*.test.ts",
    "*.test.js",
    "*.spec.ts",
    "*.spec.js",
    "test_*.py",
    "*_test.py",
];

/// Default largest file the lister admits, in bytes
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default chunk caps
pub const DEFAULT_CHUNK_MAX_LINES: usize = 120;
pub const DEFAULT_CHUNK_MAX_BYTES: usize = 8 * 1024;

/// Hard ceiling on the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Configuration for indexing
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Root directory to index
    pub root: PathBuf,
    /// Globs a file must match to be included (empty = everything)
    pub include: Vec<String>,
    /// Globs that exclude a file or directory
    pub exclude: Vec<String>,
    /// Whether to follow gitignore rules
    pub respect_gitignore: bool,
    /// Scan worker count; 1 forces sequential mode
    pub workers: usize,
    /// Files above this size are skipped
    pub max_file_size: u64,
    pub chunk_max_lines: usize,
    pub chunk_max_bytes: usize,
    /// Database file stem under `.palace/index/`
    pub db_name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            include: Vec::new(),
            exclude: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            respect_gitignore: true,
            workers: default_workers(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_max_lines: DEFAULT_CHUNK_MAX_LINES,
            chunk_max_bytes: DEFAULT_CHUNK_MAX_BYTES,
            db_name: "palace".to_string(),
        }
    }
}

impl IndexConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Defaults for `root` with `PALACE_WORKERS`, `PALACE_MAX_FILE_SIZE` and
    /// `PALACE_DB_NAME` applied
    pub fn from_env(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(root);
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("PALACE_WORKERS") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.workers = n,
                _ => warn!("ignoring invalid PALACE_WORKERS={:?}", raw),
            }
        }
        if let Some(raw) = lookup("PALACE_MAX_FILE_SIZE") {
            match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => self.max_file_size = n,
                _ => warn!("ignoring invalid PALACE_MAX_FILE_SIZE={:?}", raw),
            }
        }
        if let Some(raw) = lookup("PALACE_DB_NAME") {
            let name = raw.trim();
            if name.is_empty() || name.contains(['/', '\\']) {
                warn!("ignoring invalid PALACE_DB_NAME={:?}", raw);
            } else {
                self.db_name = name.to_string();
            }
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_excludes(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_includes(mut self, include: Vec<String>) -> Self {
        self.include = include;
        self
    }

    /// `<root>/.palace/index/<db_name>.db`
    pub fn database_path(&self) -> PathBuf {
        self.root
            .join(".palace")
            .join("index")
            .join(format!("{}.db", self.db_name))
    }

    /// `<root>/.palace/outputs/scan-summary.json`
    pub fn summary_path(&self) -> PathBuf {
        self.root
            .join(".palace")
            .join("outputs")
            .join("scan-summary.json")
    }
}

/// `min(available_parallelism, 8)`
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert!(config.workers >= 1 && config.workers <= MAX_DEFAULT_WORKERS);
        assert_eq!(config.max_file_size, 1024 * 1024);
        assert_eq!(config.chunk_max_lines, 120);
        assert_eq!(config.chunk_max_bytes, 8192);
        assert_eq!(config.db_name, "palace");
        assert!(config.exclude.iter().any(|e| e == "node_modules/"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = IndexConfig::new("/tmp/project");
        config.apply_overrides(lookup(&[
            ("PALACE_WORKERS", "3"),
            ("PALACE_MAX_FILE_SIZE", "2048"),
            ("PALACE_DB_NAME", "scratch"),
        ]));
        assert_eq!(config.workers, 3);
        assert_eq!(config.max_file_size, 2048);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/tmp/project/.palace/index/scratch.db")
        );
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = IndexConfig::new("/tmp/project").with_workers(2);
        config.apply_overrides(lookup(&[
            ("PALACE_WORKERS", "zero"),
            ("PALACE_MAX_FILE_SIZE", "0"),
            ("PALACE_DB_NAME", "../escape"),
        ]));
        assert_eq!(config.workers, 2);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.db_name, "palace");
    }

    #[test]
    fn test_summary_path() {
        let config = IndexConfig::new("/repo");
        assert_eq!(
            config.summary_path(),
            PathBuf::from("/repo/.palace/outputs/scan-summary.json")
        );
    }
}
