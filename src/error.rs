//! Typed failures callers may want to match on
//!
//! Everything else travels as `anyhow::Error` with context attached.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PalaceError {
    #[error("migration {version} failed: {message}")]
    Migration { version: i64, message: String },

    #[error("root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("scan worker panicked")]
    WorkerPanicked,

    #[error("no index found at {0}; run `palace index` first")]
    NotIndexed(PathBuf),
}
