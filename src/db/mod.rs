//! Database module for palace
//!
//! Handles SQLite storage for the index including:
//! - Schema creation and versioned migrations
//! - Transactional writes through [`IndexWriter`]
//! - File, chunk, symbol and relationship queries
//! - Full-text search over the FTS5 mirrors

mod migrations;
mod schema;
mod writer;

pub use migrations::{add_column_tolerant, latest_version, Migration, MIGRATIONS};
pub use writer::{FileCounts, IndexWriter};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::types::{
    Chunk, ChunkHit, Decision, FileRecord, IndexStats, Language, Relationship, RelationshipKind,
    ScanSummary, Symbol, SymbolKind,
};

/// Database handle for the index
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open or create a database at the given path, migrating it to the latest schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Self::initialize(conn, Some(path.to_path_buf()))
    }

    /// Create an in-memory database (for testing and throwaway indexes)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, None)
    }

    fn initialize(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        let setup = conn
            .execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                "#,
            )
            .context("failed to apply connection pragmas")
            .and_then(|_| migrations::migrate(&mut conn));

        if let Err(e) = setup {
            if let Err((_, close_err)) = conn.close() {
                warn!("failed to close database after setup error: {}", close_err);
            }
            return Err(e);
        }

        debug!(path = ?path, "database ready");
        Ok(Self { conn, path })
    }

    /// Location on disk, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Highest applied migration version, or -1 if none
    pub fn schema_version(&self) -> Result<i64> {
        migrations::current_version(&self.conn)
    }

    /// Run `f` inside one transaction; commit on `Ok`, roll back on `Err`
    pub fn write<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&IndexWriter<'_>) -> Result<T>,
    {
        let tx = self.conn.transaction()?;
        let result = f(&IndexWriter::new(&tx));
        match result {
            Ok(value) => {
                tx.commit().context("failed to commit transaction")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // =========================================================================
    // File Operations
    // =========================================================================

    /// Recorded `{path -> hash}` map
    pub fn file_hashes(&self) -> Result<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT path, hash FROM files")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut hashes = HashMap::new();
        for row in rows {
            let (path, hash): (String, String) = row?;
            hashes.insert(path, hash);
        }
        Ok(hashes)
    }

    /// Paths whose rows were written at or after `since`, sorted
    pub fn paths_indexed_since(&self, since: i64) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM files WHERE indexed_at >= ?1 ORDER BY path")?;
        let rows = stmt.query_map(params![since], |row| row.get(0))?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    pub fn file_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Get a file record by path
    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let result = self
            .conn
            .query_row(
                "SELECT path, hash, size, modified_at, indexed_at, language FROM files WHERE path = ?1",
                params![path],
                Self::row_to_file,
            )
            .optional()?;
        Ok(result)
    }

    /// All file records ordered by path
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, hash, size, modified_at, indexed_at, language FROM files ORDER BY path",
        )?;
        let rows = stmt.query_map([], Self::row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
        Ok(FileRecord {
            path: row.get(0)?,
            hash: row.get(1)?,
            size: row.get::<_, i64>(2)? as u64,
            modified_at: row.get(3)?,
            indexed_at: row.get(4)?,
            language: Language::from_name(&row.get::<_, String>(5)?),
        })
    }

    // =========================================================================
    // Chunk Operations
    // =========================================================================

    pub fn chunks_for_file(&self, path: &str) -> Result<Vec<Chunk>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT chunk_index, start_line, end_line, content
            FROM chunks WHERE path = ?1
            ORDER BY chunk_index
            "#,
        )?;
        let rows = stmt.query_map(params![path], |row| {
            Ok(Chunk {
                index: row.get::<_, i64>(0)? as u32,
                start_line: row.get::<_, i64>(1)? as u32,
                end_line: row.get::<_, i64>(2)? as u32,
                content: row.get(3)?,
            })
        })?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row?);
        }
        Ok(chunks)
    }

    /// Full-text search over chunk content, best matches first
    pub fn search_chunks(&self, query: &str, limit: u32) -> Result<Vec<ChunkHit>> {
        let Some(fts_query) = fts_query(query) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.path, c.chunk_index, c.start_line, c.end_line, c.content,
                   bm25(chunks_fts) AS rank
            FROM chunks_fts
            JOIN chunks c ON c.id = chunks_fts.rowid
            WHERE chunks_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )?;
        let rows = stmt.query_map(params![fts_query, limit as i64], |row| {
            Ok(ChunkHit {
                path: row.get(0)?,
                chunk_index: row.get::<_, i64>(1)? as u32,
                start_line: row.get::<_, i64>(2)? as u32,
                end_line: row.get::<_, i64>(3)? as u32,
                content: row.get(4)?,
                rank: row.get(5)?,
            })
        })?;

        let mut hits = Vec::new();
        for row in rows {
            hits.push(row?);
        }
        Ok(hits)
    }

    // =========================================================================
    // Symbol Operations
    // =========================================================================

    const SYMBOL_COLUMNS: &'static str = "s.id, s.file_path, s.name, s.kind, s.start_line, s.end_line, \
         s.signature, s.doc_comment, s.parent_id, s.exported";

    /// Symbols of a file in source order
    pub fn symbols_for_file(&self, path: &str) -> Result<Vec<Symbol>> {
        let sql = format!(
            "SELECT {} FROM symbols s WHERE s.file_path = ?1 ORDER BY s.start_line, s.id",
            Self::SYMBOL_COLUMNS
        );
        self.query_symbols(&sql, params![path])
    }

    /// Symbols with exactly this name, optionally restricted to callables
    pub fn symbols_named(&self, name: &str, callable_only: bool) -> Result<Vec<Symbol>> {
        let sql = if callable_only {
            format!(
                "SELECT {} FROM symbols s WHERE s.name = ?1 AND s.kind IN ('function', 'method') \
                 ORDER BY s.file_path, s.start_line",
                Self::SYMBOL_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM symbols s WHERE s.name = ?1 ORDER BY s.file_path, s.start_line",
                Self::SYMBOL_COLUMNS
            )
        };
        self.query_symbols(&sql, params![name])
    }

    /// The tightest function/method in `path` whose range contains `line`
    pub fn enclosing_symbol(&self, path: &str, line: u32) -> Result<Option<Symbol>> {
        let sql = format!(
            r#"
            SELECT {} FROM symbols s
            WHERE s.file_path = ?1
              AND s.kind IN ('function', 'method')
              AND s.start_line <= ?2 AND s.end_line >= ?2
            ORDER BY (s.end_line - s.start_line) ASC, s.start_line DESC
            LIMIT 1
            "#,
            Self::SYMBOL_COLUMNS
        );
        let result = self
            .conn
            .query_row(&sql, params![path, line as i64], Self::row_to_symbol)
            .optional()?;
        Ok(result)
    }

    /// Full-text search over symbol names, signatures and docs
    pub fn search_symbols(&self, query: &str, limit: u32) -> Result<Vec<Symbol>> {
        let Some(fts_query) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let sql = format!(
            r#"
            SELECT {} FROM symbols_fts
            JOIN symbols s ON s.id = symbols_fts.rowid
            WHERE symbols_fts MATCH ?1
            ORDER BY bm25(symbols_fts)
            LIMIT ?2
            "#,
            Self::SYMBOL_COLUMNS
        );
        self.query_symbols(&sql, params![fts_query, limit as i64])
    }

    fn query_symbols(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_symbol)?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
        Ok(Symbol {
            id: row.get(0)?,
            file_path: row.get(1)?,
            name: row.get(2)?,
            kind: SymbolKind::from_str(&row.get::<_, String>(3)?).unwrap_or(SymbolKind::Variable),
            start_line: row.get::<_, i64>(4)? as u32,
            end_line: row.get::<_, i64>(5)? as u32,
            signature: row.get(6)?,
            doc_comment: row.get(7)?,
            parent_id: row.get(8)?,
            exported: row.get(9)?,
        })
    }

    // =========================================================================
    // Relationship Operations
    // =========================================================================

    const RELATIONSHIP_COLUMNS: &'static str =
        "id, kind, source_file, source_symbol, target_file, target_symbol, line, column";

    /// Call edges whose target text contains `needle`; callers refine with a matcher
    pub fn calls_mentioning(&self, needle: &str) -> Result<Vec<Relationship>> {
        let sql = format!(
            r#"
            SELECT {} FROM relationships
            WHERE kind = 'call' AND target_symbol IS NOT NULL
              AND (target_symbol = ?1 OR instr(target_symbol, ?1) > 0)
            ORDER BY source_file, line, column
            "#,
            Self::RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&sql, params![needle])
    }

    /// Call edges made from `path` between the two lines, inclusive
    pub fn calls_in_range(&self, path: &str, start_line: u32, end_line: u32) -> Result<Vec<Relationship>> {
        let sql = format!(
            r#"
            SELECT {} FROM relationships
            WHERE kind = 'call' AND source_file = ?1 AND line BETWEEN ?2 AND ?3
            ORDER BY line, column
            "#,
            Self::RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&sql, params![path, start_line as i64, end_line as i64])
    }

    /// Relationships of one kind leaving `path`
    pub fn relationships_from(&self, path: &str, kind: RelationshipKind) -> Result<Vec<Relationship>> {
        let sql = format!(
            "SELECT {} FROM relationships WHERE source_file = ?1 AND kind = ?2 ORDER BY line, column",
            Self::RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&sql, params![path, kind.as_str()])
    }

    /// Relationships of one kind resolved to `path`
    pub fn relationships_into(&self, path: &str, kind: RelationshipKind) -> Result<Vec<Relationship>> {
        let sql = format!(
            "SELECT {} FROM relationships WHERE target_file = ?1 AND kind = ?2 ORDER BY source_file, line",
            Self::RELATIONSHIP_COLUMNS
        );
        self.query_relationships(&sql, params![path, kind.as_str()])
    }

    fn query_relationships(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Relationship>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, Self::row_to_relationship)?;

        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(row?);
        }
        Ok(relationships)
    }

    fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<Relationship> {
        Ok(Relationship {
            id: row.get(0)?,
            kind: RelationshipKind::from_str(&row.get::<_, String>(1)?)
                .unwrap_or(RelationshipKind::Reference),
            source_file: row.get(2)?,
            source_symbol: row.get(3)?,
            target_file: row.get(4)?,
            target_symbol: row.get(5)?,
            line: row.get::<_, i64>(6)? as u32,
            column: row.get::<_, i64>(7)? as u32,
        })
    }

    // =========================================================================
    // Usage Counts
    // =========================================================================

    /// Call edges leaving `path`
    pub fn outgoing_call_count(&self, path: &str) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM relationships WHERE kind = 'call' AND source_file = ?1",
            path,
        )
    }

    /// Distinct files importing `path`
    pub fn importer_count(&self, path: &str) -> Result<u64> {
        self.count(
            "SELECT COUNT(DISTINCT source_file) FROM relationships \
             WHERE kind = 'import' AND target_file = ?1 AND source_file != ?1",
            path,
        )
    }

    /// Distinct files or modules `path` imports
    pub fn import_count(&self, path: &str) -> Result<u64> {
        self.count(
            "SELECT COUNT(DISTINCT COALESCE(target_file, target_symbol)) FROM relationships \
             WHERE kind = 'import' AND source_file = ?1",
            path,
        )
    }

    pub fn symbol_count(&self, path: &str) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM symbols WHERE file_path = ?1", path)
    }

    fn count(&self, sql: &str, path: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(sql, params![path], |row| row.get(0))?;
        Ok(count as u64)
    }

    // =========================================================================
    // Scans and Decisions
    // =========================================================================

    /// The scan with the highest id
    pub fn latest_scan(&self) -> Result<Option<ScanSummary>> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT id, root_path, scan_hash, commit_hash, started_at, completed_at,
                       file_count, chunk_count, symbol_count, relationship_count
                FROM scans ORDER BY id DESC LIMIT 1
                "#,
                [],
                |row| {
                    Ok(ScanSummary {
                        id: row.get(0)?,
                        root_path: row.get(1)?,
                        scan_hash: row.get(2)?,
                        commit_hash: row.get(3)?,
                        started_at: row.get(4)?,
                        completed_at: row.get(5)?,
                        file_count: row.get::<_, i64>(6)? as u64,
                        chunk_count: row.get::<_, i64>(7)? as u64,
                        symbol_count: row.get::<_, i64>(8)? as u64,
                        relationship_count: row.get::<_, i64>(9)? as u64,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// Recorded decisions scoped to one of `paths` (or unscoped), newest first
    pub fn decisions_for_paths(&self, paths: &[String], limit: u32) -> Result<Vec<Decision>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, content, rationale, scope_path, created_at
            FROM decisions ORDER BY created_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Decision {
                id: row.get(0)?,
                content: row.get(1)?,
                rationale: row.get(2)?,
                scope_path: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        let mut decisions = Vec::new();
        for row in rows {
            let decision = row?;
            let in_scope = match &decision.scope_path {
                None => true,
                Some(scope) => paths
                    .iter()
                    .any(|p| p == scope || p.starts_with(&format!("{}/", scope.trim_end_matches('/')))),
            };
            if in_scope {
                decisions.push(decision);
                if decisions.len() >= limit as usize {
                    break;
                }
            }
        }
        Ok(decisions)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get index statistics
    pub fn get_stats(&self) -> Result<IndexStats> {
        let total = |table: &str| -> Result<u64> {
            let count: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(count as u64)
        };

        let db_size_bytes: i64 = self
            .conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .context("Failed to read database size")?;

        let mut stmt = self
            .conn
            .prepare("SELECT language, COUNT(*) FROM files GROUP BY language ORDER BY COUNT(*) DESC")?;
        let lang_rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((Language::from_name(&name), count as u64))
        })?;
        let mut languages = Vec::new();
        for row in lang_rows {
            languages.push(row?);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM symbols GROUP BY kind ORDER BY COUNT(*) DESC")?;
        let kind_rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((kind, count as u64))
        })?;
        let mut symbol_kinds = Vec::new();
        for row in kind_rows {
            let (kind, count) = row?;
            if let Some(kind) = SymbolKind::from_str(&kind) {
                symbol_kinds.push((kind, count));
            }
        }

        Ok(IndexStats {
            total_files: total("files")?,
            total_chunks: total("chunks")?,
            total_symbols: total("symbols")?,
            total_relationships: total("relationships")?,
            db_size_bytes: db_size_bytes.max(0) as u64,
            schema_version: self.schema_version()?,
            languages,
            symbol_kinds,
        })
    }
}

/// Turn free text into an FTS5 query: quoted alphanumeric terms joined by OR
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
