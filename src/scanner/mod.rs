//! Scanner: turns listed files into hashed, chunked and analyzed facts
//!
//! Small inputs run on the calling thread; larger ones fan out over
//! [`pool::run_parallel`]. Both paths produce the same output in the same
//! order as the listing.

pub mod chunk;
pub mod lister;
pub mod pool;

pub use chunk::chunk_content;
pub use lister::{relative_path, FileLister, ListedFile, WalkLister};

use std::path::Path;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::error::PalaceError;
use crate::extraction::{Analyzer, AnalyzerFactory, AnalyzerOptions};
use crate::types::{Language, ScannedFile};

/// Scan every listed file, in listing order
pub fn scan_files(
    files: &[ListedFile],
    config: &IndexConfig,
    factory: &dyn AnalyzerFactory,
) -> Result<Vec<ScannedFile>> {
    let workers = config.workers.max(1);
    if workers == 1 || files.len() < 2 * workers {
        debug!(files = files.len(), "scanning sequentially");
        let mut analyzer = factory.create(&AnalyzerOptions::default());
        return files
            .iter()
            .map(|file| process_file(file, config, analyzer.as_mut()))
            .collect();
    }

    debug!(files = files.len(), workers, "scanning with worker pool");
    pool::run_parallel(files.len(), workers, factory, |index, analyzer| {
        process_file(&files[index], config, analyzer)
    })
}

/// Read, hash, chunk and analyze one file.
///
/// A read failure is an error; an analyzer failure only costs the file its
/// symbols and relationships.
pub fn process_file(
    file: &ListedFile,
    config: &IndexConfig,
    analyzer: &mut dyn Analyzer,
) -> Result<ScannedFile> {
    let bytes = std::fs::read(&file.abs_path).map_err(|source| PalaceError::ReadFile {
        path: file.path.clone(),
        source,
    })?;
    let hash = hash_bytes(&bytes);
    let content = String::from_utf8_lossy(&bytes);
    let language = Language::detect(&file.path);
    let chunks = chunk_content(&content, config.chunk_max_lines, config.chunk_max_bytes);

    let analysis = if language == Language::Unknown {
        None
    } else {
        match analyzer.analyze(&file.path, language, &content) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Analysis failed for {}: {:#}", file.path, e);
                None
            }
        }
    };

    Ok(ScannedFile {
        path: file.path.clone(),
        hash,
        size: bytes.len() as u64,
        modified_at: file.modified_at,
        language,
        chunks,
        analysis,
    })
}

/// Hex SHA-256 of raw bytes
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of a file on disk
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    std::fs::read(path).map(|bytes| hash_bytes(&bytes))
}

/// Aggregate hash over `(path, hash)` pairs, independent of input order
pub fn aggregate_hash<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut entries: Vec<(&str, &str)> = entries.into_iter().collect();
    entries.sort_unstable();

    let mut hasher = Sha256::new();
    for (path, hash) in entries {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}
