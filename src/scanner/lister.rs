//! Candidate file enumeration
//!
//! The default [`WalkLister`] walks with the `ignore` crate, applying gitignore
//! rules plus include/exclude glob overrides, and drops oversized and binary
//! files before anything reads them in full.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::config::IndexConfig;

/// Bytes inspected when sniffing for binary content
const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// The index's own data directory is never scanned, whatever the excludes say
const DATA_DIR_EXCLUDE: &str = "!.palace/";

/// A file admitted for scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    /// Root-relative, `/`-separated
    pub path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    /// Unix seconds
    pub modified_at: i64,
}

/// Enumerates candidate files under a root, sorted by path
pub trait FileLister {
    fn list(&self, root: &Path) -> Result<Vec<ListedFile>>;
}

/// `ignore`-crate walker with glob overrides
#[derive(Debug, Clone)]
pub struct WalkLister {
    include: Vec<String>,
    exclude: Vec<String>,
    respect_gitignore: bool,
    max_file_size: u64,
}

impl WalkLister {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            include: config.include.clone(),
            exclude: config.exclude.clone(),
            respect_gitignore: config.respect_gitignore,
            max_file_size: config.max_file_size,
        }
    }

    fn overrides(&self, root: &Path) -> Result<Override> {
        let mut builder = OverrideBuilder::new(root);
        for glob in &self.include {
            builder
                .add(glob)
                .with_context(|| format!("invalid include glob {:?}", glob))?;
        }
        for glob in &self.exclude {
            builder
                .add(&format!("!{}", glob))
                .with_context(|| format!("invalid exclude glob {:?}", glob))?;
        }
        builder.add(DATA_DIR_EXCLUDE)?;
        Ok(builder.build()?)
    }
}

impl FileLister for WalkLister {
    fn list(&self, root: &Path) -> Result<Vec<ListedFile>> {
        let mut walker = WalkBuilder::new(root);
        walker
            .hidden(false)
            .git_ignore(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .overrides(self.overrides(root)?);

        let mut files = Vec::new();
        for entry in walker.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("Error walking directory: {}", err);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let abs_path = entry.path();

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    warn!("Skipping {}: {}", abs_path.display(), err);
                    continue;
                }
            };

            let Some(path) = relative_path(root, abs_path) else {
                continue;
            };

            if metadata.len() > self.max_file_size {
                debug!(path = %path, size = metadata.len(), "skipping oversized file");
                continue;
            }

            match looks_binary(abs_path) {
                Ok(true) => {
                    debug!(path = %path, "skipping binary file");
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("Skipping unreadable {}: {}", path, err);
                    continue;
                }
            }

            let modified_at = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            files.push(ListedFile {
                path,
                abs_path: abs_path.to_path_buf(),
                size: metadata.len(),
                modified_at,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// Root-relative path with `/` separators
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// A NUL byte in the first 8 KiB marks a file as binary
fn looks_binary(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; BINARY_SNIFF_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(buf[..filled].contains(&0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn listed(root: &Path, config: &IndexConfig) -> Vec<String> {
        WalkLister::new(config)
            .list(root)
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect()
    }

    #[test]
    fn test_default_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.rs", b"fn main() {}");
        write(root, "src/lib.rs", b"pub fn lib() {}");
        write(root, "node_modules/pkg/index.js", b"module.exports = {}");
        write(root, "Cargo.lock", b"# lock");
        write(root, "web/app.min.js", b"var a=1");
        write(root, "web/app.test.ts", b"test()");
        write(root, "tools/test_cli.py", b"def test(): pass");
        write(root, ".palace/index/palace.db", b"sqlite");

        let config = IndexConfig::new(root);
        assert_eq!(listed(root, &config), vec!["src/lib.rs", "src/main.rs"]);
    }

    #[test]
    fn test_include_globs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/a.rs", b"fn a() {}");
        write(root, "src/b.py", b"def b(): pass");
        write(root, "README.md", b"# readme");

        let config = IndexConfig::new(root).with_includes(vec!["*.rs".to_string()]);
        assert_eq!(listed(root, &config), vec!["src/a.rs"]);
    }

    #[test]
    fn test_replaced_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "vendor/lib.go", b"package lib");
        write(root, "generated/api.go", b"package api");

        let config = IndexConfig::new(root).with_excludes(vec!["generated/".to_string()]);
        assert_eq!(listed(root, &config), vec!["vendor/lib.go"]);
    }

    #[test]
    fn test_skips_binary_and_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "text.txt", b"hello");
        write(root, "image.bin", &[0x89, b'P', b'N', b'G', 0, 0, 1]);
        write(root, "big.txt", &vec![b'a'; 4096]);

        let mut config = IndexConfig::new(root);
        config.max_file_size = 1024;
        assert_eq!(listed(root, &config), vec!["text.txt"]);
    }

    #[test]
    fn test_relative_path() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, Path::new("/repo/src/db/mod.rs")),
            Some("src/db/mod.rs".to_string())
        );
        assert_eq!(relative_path(root, Path::new("/repo")), None);
        assert_eq!(relative_path(root, Path::new("/elsewhere/x.rs")), None);
    }
}
