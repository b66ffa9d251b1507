//! Write path: every mutation of the index goes through an `IndexWriter`
//! handed out by [`Database::write`](super::Database::write), so it always
//! runs inside a transaction.

use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::types::{Chunk, FileRecord, RelationshipFact, ScanSummary, ScannedFile, SymbolNode};

/// Rows written for one file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCounts {
    pub chunks: u64,
    pub symbols: u64,
    pub relationships: u64,
}

pub struct IndexWriter<'a> {
    conn: &'a Connection,
}

impl<'a> IndexWriter<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Remove every indexed fact, full-text mirrors included
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM chunks_fts;
            DELETE FROM symbols_fts;
            DELETE FROM relationships;
            DELETE FROM symbols;
            DELETE FROM chunks;
            DELETE FROM files;
            "#,
        )?;
        Ok(())
    }

    /// Remove one file and everything derived from it; returns whether it existed
    pub fn delete_path(&self, path: &str) -> Result<bool> {
        self.conn.execute(
            "DELETE FROM chunks_fts WHERE rowid IN (SELECT id FROM chunks WHERE path = ?1)",
            params![path],
        )?;
        self.conn.execute(
            "DELETE FROM symbols_fts WHERE rowid IN (SELECT id FROM symbols WHERE file_path = ?1)",
            params![path],
        )?;
        // imports from other files go back to unresolved until the next resolution pass
        self.conn.execute(
            "UPDATE relationships SET target_file = NULL \
             WHERE kind = 'import' AND target_file = ?1 AND source_file != ?1",
            params![path],
        )?;
        // chunks, symbols and relationships follow through ON DELETE CASCADE
        let removed = self
            .conn
            .execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(removed > 0)
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    pub fn insert_file(&self, file: &FileRecord) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO files (path, hash, size, modified_at, indexed_at, language)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    file.path,
                    file.hash,
                    file.size as i64,
                    file.modified_at,
                    file.indexed_at,
                    file.language.as_str(),
                ],
            )
            .with_context(|| format!("failed to insert file {}", file.path))?;
        Ok(())
    }

    pub fn insert_chunks(&self, path: &str, chunks: &[Chunk]) -> Result<u64> {
        let mut insert = self.conn.prepare_cached(
            r#"
            INSERT INTO chunks (path, chunk_index, start_line, end_line, content)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        let mut mirror = self.conn.prepare_cached(
            "INSERT INTO chunks_fts (rowid, path, chunk_index, content) VALUES (?1, ?2, ?3, ?4)",
        )?;

        for chunk in chunks {
            insert.execute(params![
                path,
                chunk.index as i64,
                chunk.start_line as i64,
                chunk.end_line as i64,
                chunk.content,
            ])?;
            let id = self.conn.last_insert_rowid();
            mirror.execute(params![id, path, chunk.index as i64, chunk.content])?;
        }
        Ok(chunks.len() as u64)
    }

    /// Insert a symbol forest, assigning parent ids from the nesting
    pub fn insert_symbols(&self, path: &str, roots: &[SymbolNode]) -> Result<u64> {
        let mut insert = self.conn.prepare_cached(
            r#"
            INSERT INTO symbols (
                file_path, name, kind, start_line, end_line,
                signature, doc_comment, parent_id, exported
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )?;
        let mut mirror = self.conn.prepare_cached(
            "INSERT INTO symbols_fts (rowid, name, signature, doc_comment, file_path) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        let mut count = 0u64;
        let mut stack: Vec<(&SymbolNode, Option<i64>)> =
            roots.iter().rev().map(|node| (node, None)).collect();

        while let Some((node, parent_id)) = stack.pop() {
            insert.execute(params![
                path,
                node.name,
                node.kind.as_str(),
                node.start_line as i64,
                node.end_line as i64,
                node.signature,
                node.doc_comment,
                parent_id,
                node.exported,
            ])?;
            let id = self.conn.last_insert_rowid();
            mirror.execute(params![id, node.name, node.signature, node.doc_comment, path])?;
            count += 1;

            for child in node.children.iter().rev() {
                stack.push((child, Some(id)));
            }
        }
        Ok(count)
    }

    pub fn insert_relationships(&self, path: &str, relationships: &[RelationshipFact]) -> Result<u64> {
        let mut insert = self.conn.prepare_cached(
            r#"
            INSERT INTO relationships (
                kind, source_file, source_symbol, target_file, target_symbol, line, column
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;

        for rel in relationships {
            insert.execute(params![
                rel.kind.as_str(),
                path,
                rel.source_symbol,
                rel.target_file,
                rel.target_symbol,
                rel.line as i64,
                rel.column as i64,
            ])?;
        }
        Ok(relationships.len() as u64)
    }

    /// Insert a file row and every fact the scanner derived from it
    pub fn insert_scanned_file(&self, file: &ScannedFile, indexed_at: i64) -> Result<FileCounts> {
        self.insert_file(&FileRecord {
            path: file.path.clone(),
            hash: file.hash.clone(),
            size: file.size,
            modified_at: file.modified_at,
            indexed_at,
            language: file.language,
        })?;

        let mut counts = FileCounts {
            chunks: self.insert_chunks(&file.path, &file.chunks)?,
            ..FileCounts::default()
        };
        if let Some(analysis) = &file.analysis {
            counts.symbols = self.insert_symbols(&file.path, &analysis.symbols)?;
            counts.relationships = self.insert_relationships(&file.path, &analysis.relationships)?;
        }
        Ok(counts)
    }

    /// Record a full scan; returns the new scan id
    pub fn insert_scan(&self, scan: &ScanSummary) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO scans (
                root_path, scan_hash, commit_hash, started_at, completed_at,
                file_count, chunk_count, symbol_count, relationship_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                scan.root_path,
                scan.scan_hash,
                scan.commit_hash,
                scan.started_at,
                scan.completed_at,
                scan.file_count as i64,
                scan.chunk_count as i64,
                scan.symbol_count as i64,
                scan.relationship_count as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Record an architectural decision, optionally scoped to a path prefix
    pub fn record_decision(
        &self,
        content: &str,
        rationale: Option<&str>,
        scope_path: Option<&str>,
        created_at: i64,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO decisions (content, rationale, scope_path, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![content, rationale, scope_path, created_at],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // =========================================================================
    // Import Resolution
    // =========================================================================

    /// Point unresolved imports at indexed files by module-path suffix.
    /// Returns the number of relationships resolved.
    pub fn resolve_import_targets(&self) -> Result<u64> {
        let mut stmt = self.conn.prepare("SELECT path FROM files")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let modules = ModuleIndex::build(&paths);

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, source_file, target_symbol FROM relationships
            WHERE kind = 'import' AND target_file IS NULL AND target_symbol IS NOT NULL
            "#,
        )?;
        let pending = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut update = self
            .conn
            .prepare_cached("UPDATE relationships SET target_file = ?1 WHERE id = ?2")?;
        let mut resolved = 0u64;
        for (id, source, module) in pending {
            if let Some(target) = modules.resolve(&source, &module) {
                if target != source {
                    update.execute(params![target, id])?;
                    resolved += 1;
                }
            }
        }

        debug!(resolved, "resolved import targets");
        Ok(resolved)
    }
}

/// Indexed paths keyed by their module form: extension stripped, and
/// `index`/`mod`/`__init__` files also standing for their directory
struct ModuleIndex<'p> {
    by_key: HashMap<String, Vec<&'p str>>,
    by_last_segment: HashMap<String, Vec<String>>,
}

impl<'p> ModuleIndex<'p> {
    fn build(paths: &'p [String]) -> Self {
        let mut by_key: HashMap<String, Vec<&'p str>> = HashMap::new();
        for path in paths {
            for key in module_keys(path) {
                by_key.entry(key).or_default().push(path.as_str());
            }
        }
        let mut by_last_segment: HashMap<String, Vec<String>> = HashMap::new();
        for key in by_key.keys() {
            let last = key.rsplit('/').next().unwrap_or(key).to_string();
            by_last_segment.entry(last).or_default().push(key.clone());
        }
        Self {
            by_key,
            by_last_segment,
        }
    }

    fn resolve(&self, source: &str, module: &str) -> Option<String> {
        let module = module.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '<' || c == '>');
        if module.is_empty() {
            return None;
        }

        if module.starts_with("./") || module.starts_with("../") {
            let dir = source.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
            let joined = normalize_relative(dir, module)?;
            return self.unique(&strip_extension(&joined)).or_else(|| self.unique(&joined));
        }

        let rust_style = module.contains("::");
        let mut segments: Vec<&str> = if rust_style {
            module
                .split("::")
                .filter(|s| !matches!(*s, "crate" | "self" | "super" | "" | "*"))
                .collect()
        } else if module.contains('/') {
            module.trim_start_matches("@/").split('/').collect()
        } else {
            module.split('.').collect()
        };

        // `use a::b::Item` names an item inside module `a::b`
        while !segments.is_empty() {
            let candidate = segments.join("/");
            if let Some(found) = self.best_suffix_match(&candidate) {
                return Some(found);
            }
            if !rust_style {
                break;
            }
            segments.pop();
        }
        None
    }

    fn unique(&self, key: &str) -> Option<String> {
        match self.by_key.get(key).map(Vec::as_slice) {
            Some([only]) => Some(only.to_string()),
            _ => None,
        }
    }

    /// The single file whose key equals or ends with `/candidate`, preferring the shortest key
    fn best_suffix_match(&self, candidate: &str) -> Option<String> {
        let last = candidate.rsplit('/').next().unwrap_or(candidate);
        let keys = self.by_last_segment.get(last)?;
        let suffix = format!("/{}", candidate);

        let mut matching: Vec<&String> = keys
            .iter()
            .filter(|k| k.as_str() == candidate || k.ends_with(&suffix))
            .collect();
        matching.sort_by_key(|k| (k.len(), k.as_str()));

        let shortest = matching.first()?.len();
        let mut best: Vec<&str> = matching
            .iter()
            .filter(|k| k.len() == shortest)
            .flat_map(|k| self.by_key.get(k.as_str()).into_iter().flatten().copied())
            .collect();
        best.sort_unstable();
        best.dedup();

        match best.as_slice() {
            [only] => Some(only.to_string()),
            _ => None,
        }
    }
}

fn module_keys(path: &str) -> Vec<String> {
    let stem = strip_extension(path);
    let mut keys = vec![stem.clone()];
    if let Some((dir, file)) = stem.rsplit_once('/') {
        if matches!(file, "index" | "mod" | "__init__" | "lib") {
            keys.push(dir.to_string());
        }
    }
    keys
}

fn strip_extension(path: &str) -> String {
    let (dir, file) = match path.rsplit_once('/') {
        Some((d, f)) => (Some(d), f),
        None => (None, path),
    };
    let stem = match file.rsplit_once('.') {
        Some((s, _)) if !s.is_empty() => s,
        _ => file,
    };
    match dir {
        Some(d) => format!("{}/{}", d, stem),
        None => stem.to_string(),
    }
}

/// Join a `./` or `../` module onto a directory; `None` if it climbs above the root
fn normalize_relative(dir: &str, module: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in module.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::types::{FileAnalysis, Language, RelationshipKind, SymbolKind};

    fn file(path: &str) -> ScannedFile {
        ScannedFile {
            path: path.to_string(),
            hash: "h".to_string(),
            size: 1,
            modified_at: 0,
            language: Language::detect(path),
            chunks: vec![Chunk {
                index: 0,
                start_line: 1,
                end_line: 1,
                content: format!("contents of {}", path),
            }],
            analysis: None,
        }
    }

    fn import(module: &str) -> RelationshipFact {
        RelationshipFact {
            kind: RelationshipKind::Import,
            source_symbol: None,
            target_file: None,
            target_symbol: Some(module.to_string()),
            line: 1,
            column: 0,
        }
    }

    fn fts_count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_symbol_tree_parent_ids() {
        let mut db = Database::in_memory().unwrap();
        let method = SymbolNode {
            name: "area".to_string(),
            kind: SymbolKind::Method,
            start_line: 2,
            end_line: 4,
            signature: None,
            doc_comment: None,
            exported: false,
            children: Vec::new(),
        };
        let class = SymbolNode {
            name: "Shape".to_string(),
            kind: SymbolKind::Class,
            start_line: 1,
            end_line: 5,
            signature: None,
            doc_comment: Some("A shape".to_string()),
            exported: true,
            children: vec![method],
        };
        let mut f = file("shape.py");
        f.analysis = Some(FileAnalysis {
            symbols: vec![class],
            relationships: Vec::new(),
        });

        let counts = db.write(|w| w.insert_scanned_file(&f, 10)).unwrap();
        assert_eq!(counts.symbols, 2);

        let symbols = db.symbols_for_file("shape.py").unwrap();
        assert_eq!(symbols[0].name, "Shape");
        assert_eq!(symbols[0].parent_id, None);
        assert_eq!(symbols[1].parent_id, Some(symbols[0].id));
        assert_eq!(fts_count(&db, "symbols_fts"), 2);
    }

    #[test]
    fn test_delete_path_removes_mirrors_and_cascades() {
        let mut db = Database::in_memory().unwrap();
        let mut f = file("a.rs");
        f.analysis = Some(FileAnalysis {
            symbols: vec![SymbolNode {
                name: "a".to_string(),
                kind: SymbolKind::Function,
                start_line: 1,
                end_line: 1,
                signature: None,
                doc_comment: None,
                exported: false,
                children: Vec::new(),
            }],
            relationships: vec![import("std::fmt")],
        });
        db.write(|w| {
            w.insert_scanned_file(&f, 1)?;
            w.insert_scanned_file(&file("b.rs"), 1)?;
            Ok(())
        })
        .unwrap();

        let removed = db.write(|w| w.delete_path("a.rs")).unwrap();
        assert!(removed);
        assert_eq!(db.file_count().unwrap(), 1);
        assert_eq!(fts_count(&db, "chunks_fts"), 1);
        assert_eq!(fts_count(&db, "symbols_fts"), 0);
        assert_eq!(fts_count(&db, "relationships"), 0);

        assert!(!db.write(|w| w.delete_path("missing.rs")).unwrap());
    }

    #[test]
    fn test_clear_all() {
        let mut db = Database::in_memory().unwrap();
        db.write(|w| w.insert_scanned_file(&file("a.rs"), 1).map(|_| ()))
            .unwrap();
        db.write(|w| w.clear_all()).unwrap();
        assert_eq!(db.file_count().unwrap(), 0);
        assert_eq!(fts_count(&db, "chunks_fts"), 0);
    }

    #[test]
    fn test_resolve_import_targets() {
        let mut db = Database::in_memory().unwrap();
        let mut app = file("web/src/app.ts");
        app.analysis = Some(FileAnalysis {
            symbols: Vec::new(),
            relationships: vec![import("./utils/format"), import("react")],
        });
        let mut main = file("src/main.rs");
        main.analysis = Some(FileAnalysis {
            symbols: Vec::new(),
            relationships: vec![import("crate::db::Database")],
        });
        let mut py = file("tools/run.py");
        py.analysis = Some(FileAnalysis {
            symbols: Vec::new(),
            relationships: vec![import("pkg.helpers")],
        });

        db.write(|w| {
            for f in [
                &app,
                &main,
                &py,
                &file("web/src/utils/format.ts"),
                &file("src/db/mod.rs"),
                &file("tools/pkg/helpers.py"),
            ] {
                w.insert_scanned_file(f, 1)?;
            }
            w.resolve_import_targets()
        })
        .unwrap();

        let target = |path: &str| -> Vec<Option<String>> {
            db.relationships_from(path, RelationshipKind::Import)
                .unwrap()
                .into_iter()
                .map(|r| r.target_file)
                .collect()
        };
        assert_eq!(
            target("web/src/app.ts"),
            vec![Some("web/src/utils/format.ts".to_string()), None]
        );
        assert_eq!(target("src/main.rs"), vec![Some("src/db/mod.rs".to_string())]);
        assert_eq!(target("tools/run.py"), vec![Some("tools/pkg/helpers.py".to_string())]);
    }

    #[test]
    fn test_ambiguous_import_stays_unresolved() {
        let paths = vec!["a/util.py".to_string(), "b/util.py".to_string()];
        let index = ModuleIndex::build(&paths);
        assert_eq!(index.resolve("main.py", "util"), None);
        assert_eq!(index.resolve("main.py", "a.util"), Some("a/util.py".to_string()));
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(normalize_relative("src/app", "../lib/x"), Some("src/lib/x".to_string()));
        assert_eq!(normalize_relative("", "../x"), None);
        assert_eq!(strip_extension("a/b.test.ts"), "a/b.test");
    }
}
