//! Database schema definition
//!
//! Each constant is the body of one migration step; see `migrations.rs`.

/// Migration 1: core index tables
pub const CORE_SCHEMA: &str = r#"
-- Files table: one row per tracked file
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    indexed_at INTEGER NOT NULL,
    language TEXT NOT NULL
);

-- Chunks table: line-aligned windows of file content
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    UNIQUE (path, chunk_index),
    FOREIGN KEY (path) REFERENCES files(path) ON DELETE CASCADE
);

-- Full-text mirror of chunks; rowid = chunks.id
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    path UNINDEXED,
    chunk_index UNINDEXED,
    content
);

-- Symbols table: per-file symbol tree
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    signature TEXT,
    doc_comment TEXT,
    parent_id INTEGER,
    exported INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (file_path) REFERENCES files(path) ON DELETE CASCADE,
    FOREIGN KEY (parent_id) REFERENCES symbols(id) ON DELETE CASCADE
);

-- Full-text mirror of symbols; rowid = symbols.id
CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
    name,
    signature,
    doc_comment,
    file_path UNINDEXED
);

-- Relationships table: import/call/reference edges
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    source_file TEXT NOT NULL,
    source_symbol TEXT,
    target_file TEXT,
    target_symbol TEXT,
    line INTEGER NOT NULL,
    column INTEGER NOT NULL,
    FOREIGN KEY (source_file) REFERENCES files(path) ON DELETE CASCADE
);

-- Scans table: provenance of each full scan
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    root_path TEXT NOT NULL,
    scan_hash TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER NOT NULL,
    file_count INTEGER NOT NULL,
    chunk_count INTEGER NOT NULL,
    symbol_count INTEGER NOT NULL,
    relationship_count INTEGER NOT NULL
);

-- Indexes for efficient queries
CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
CREATE INDEX IF NOT EXISTS idx_symbols_file_path ON symbols(file_path);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_symbols_parent ON symbols(parent_id);
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_file);
CREATE INDEX IF NOT EXISTS idx_relationships_kind ON relationships(kind);
"#;

/// Migration 3: tables owned by the memory subsystem
pub const MEMORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS decisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    rationale TEXT,
    scope_path TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    agent TEXT,
    goal TEXT,
    state TEXT NOT NULL DEFAULT 'active',
    started_at INTEGER NOT NULL,
    ended_at INTEGER
);

CREATE TABLE IF NOT EXISTS rooms (
    name TEXT PRIMARY KEY,
    description TEXT,
    paths TEXT NOT NULL DEFAULT '[]',
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_decisions_scope ON decisions(scope_path);
"#;

/// Migration 4: lookups by callee name suffix and by import target
pub const RELATIONSHIP_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_relationships_kind_target_symbol
    ON relationships(kind, target_symbol);
CREATE INDEX IF NOT EXISTS idx_relationships_kind_target_file
    ON relationships(kind, target_file);
"#;
