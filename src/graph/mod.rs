//! Graph traversal and query operations
//!
//! Provides algorithms for:
//! - Finding callers/callees of a symbol
//! - Recursive call chains (up, down or both)
//! - Import-dependency expansion

pub mod calls;
pub mod chain;
pub mod deps;
pub mod matcher;

pub use calls::CallSite;
pub use chain::{
    flatten, CallChainConfig, CallChainNode, CallChainResult, CallChainTree, ChainDirection,
    ChainStep,
};
pub use deps::{DependencyConfig, DependencyDirection, DependencyExpansion, ExpandedFile};
pub use matcher::{SuffixMatcher, SymbolMatcher};

use crate::db::Database;

pub const DEFAULT_MAX_DEPTH: u32 = 3;
pub const MAX_DEPTH_LIMIT: u32 = 10;
pub const DEFAULT_MAX_PATHS: usize = 100;
pub const DEFAULT_MAX_FILES: usize = 100;

/// Clamp a requested traversal depth into `[1, MAX_DEPTH_LIMIT]`
pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(1, MAX_DEPTH_LIMIT)
}

/// Graph operations on the code database
pub struct Graph<'a> {
    db: &'a Database,
    matcher: Box<dyn SymbolMatcher + 'a>,
}

impl<'a> Graph<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            matcher: Box::new(SuffixMatcher::default()),
        }
    }

    /// Use a different rule for matching call targets to symbol names
    pub fn with_matcher(mut self, matcher: impl SymbolMatcher + 'a) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn database(&self) -> &'a Database {
        self.db
    }

    pub fn matcher(&self) -> &dyn SymbolMatcher {
        self.matcher.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{FileRecord, Language, RelationshipFact, RelationshipKind, SymbolKind, SymbolNode};

    pub(crate) fn file(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            hash: format!("hash-{}", path),
            size: 100,
            modified_at: 0,
            indexed_at: 0,
            language: Language::detect(path),
        }
    }

    pub(crate) fn func(name: &str, start: u32, end: u32) -> SymbolNode {
        SymbolNode {
            name: name.to_string(),
            kind: SymbolKind::Function,
            start_line: start,
            end_line: end,
            signature: Some(format!("fn {}()", name)),
            doc_comment: None,
            exported: true,
            children: Vec::new(),
        }
    }

    pub(crate) fn call(source: Option<&str>, target: &str, line: u32) -> RelationshipFact {
        RelationshipFact {
            kind: RelationshipKind::Call,
            source_symbol: source.map(str::to_string),
            target_file: None,
            target_symbol: Some(target.to_string()),
            line,
            column: 4,
        }
    }

    pub(crate) fn import(module: &str, target_file: Option<&str>) -> RelationshipFact {
        RelationshipFact {
            kind: RelationshipKind::Import,
            source_symbol: None,
            target_file: target_file.map(str::to_string),
            target_symbol: Some(module.to_string()),
            line: 1,
            column: 0,
        }
    }

    /// main.rs: `main` calls `helper` (line 5) and `worker::run` (line 6).
    /// worker.rs: `run` calls `util::helper` (12) and `self.flush` (13);
    /// `finish` and `flush` call nothing.
    pub(crate) fn fixture_db() -> Database {
        let mut db = Database::in_memory().unwrap();
        db.write(|w| {
            w.insert_file(&file("src/util.rs"))?;
            w.insert_symbols("src/util.rs", &[func("helper", 1, 3)])?;

            w.insert_file(&file("src/main.rs"))?;
            w.insert_symbols("src/main.rs", &[func("main", 3, 8)])?;
            w.insert_relationships(
                "src/main.rs",
                &[call(Some("main"), "helper", 5), call(Some("main"), "worker::run", 6)],
            )?;

            w.insert_file(&file("src/worker.rs"))?;
            w.insert_symbols(
                "src/worker.rs",
                &[func("run", 10, 15), func("finish", 20, 25), func("flush", 30, 32)],
            )?;
            w.insert_relationships(
                "src/worker.rs",
                &[call(Some("run"), "util::helper", 12), call(Some("run"), "self.flush", 13)],
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_clamp_depth() {
        assert_eq!(clamp_depth(0), 1);
        assert_eq!(clamp_depth(3), 3);
        assert_eq!(clamp_depth(11), 10);
        assert_eq!(clamp_depth(u32::MAX), 10);
    }

    #[test]
    fn test_custom_matcher() {
        let db = fixture_db();
        let graph = Graph::new(&db).with_matcher(SuffixMatcher::new(["::"]));
        // exact and `::` forms still match, `self.flush` no longer does
        let sites = graph.incoming_calls("helper").unwrap();
        assert_eq!(sites.len(), 2);
        let sites = graph.incoming_calls("flush").unwrap();
        assert!(sites.is_empty());
    }
}
