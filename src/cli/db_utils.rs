//! Project root and database location helpers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::IndexConfig;
use crate::db::Database;
use crate::error::PalaceError;

/// Canonicalize and validate a project root
pub fn canonicalize_path(path: &str) -> Result<PathBuf> {
    let root = Path::new(path);
    if !root.is_dir() {
        return Err(PalaceError::RootNotFound(root.to_path_buf()).into());
    }
    root.canonicalize()
        .with_context(|| format!("invalid path {}", path))
}

/// Configuration for a project root, with environment overrides applied
pub fn project_config(path: &str) -> Result<IndexConfig> {
    Ok(IndexConfig::from_env(canonicalize_path(path)?))
}

/// Open (creating if needed) the database for a project
pub fn open_project_database(config: &IndexConfig) -> Result<Database> {
    Database::open(config.database_path())
}

/// Open the database of a project that must already be indexed
pub fn open_existing_database(config: &IndexConfig) -> Result<Database> {
    let db_path = config.database_path();
    if !db_path.exists() {
        return Err(PalaceError::NotIndexed(db_path).into());
    }
    Database::open(&db_path)
}
