//! Context builder for AI tasks
//!
//! Builds focused, token-budgeted context for a free-text task by:
//! - Finding seed files through full-text chunk search
//! - Ranking seeds and their dependencies
//! - Attaching snippets, symbols, imports and recorded decisions

pub mod budget;
pub mod ranking;

pub use budget::{symbol_priority, truncate_to_token_budget, BudgetItem, BudgetOutcome};
pub use ranking::{
    dependency_score, rank_context, rank_files, recency_score, ContextScore, RankedContext,
    RankingStats, SeedFile, SmartContextConfig,
};

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::Database;
use crate::graph::Graph;
use crate::tokens::estimate_tokens;
use crate::types::{ChunkHit, Decision, RelationshipKind, SymbolKind};

/// Share of an over-budget result given to files, symbols and imports
const FILE_SHARE: usize = 50;
const SYMBOL_SHARE: usize = 40;

/// Options for building context
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub token_budget: usize,
    /// Chunk hits considered when picking seeds
    pub max_seed_hits: u32,
    pub include_symbols: bool,
    pub include_imports: bool,
    pub max_decisions: u32,
    pub ranking: SmartContextConfig,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            token_budget: 8000,
            max_seed_hits: 30,
            include_symbols: true,
            include_imports: true,
            max_decisions: 5,
            ranking: SmartContextConfig {
                max_files: 10,
                ..SmartContextConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFile {
    pub path: String,
    pub score: ContextScore,
    pub snippet: Option<Snippet>,
    pub tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSymbol {
    pub path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextImport {
    pub source_file: String,
    pub module: String,
    pub target_file: Option<String>,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    pub query: String,
    pub keywords: Vec<String>,
    pub files: Vec<ContextFile>,
    pub symbols: Vec<ContextSymbol>,
    pub imports: Vec<ContextImport>,
    pub decisions: Vec<Decision>,
    pub stats: RankingStats,
    pub total_tokens: usize,
    pub token_budget: usize,
    pub truncated: bool,
    pub warnings: Vec<String>,
}

/// Builds task context from the index
pub struct ContextBuilder<'a> {
    db: &'a Database,
    graph: Graph<'a>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            graph: Graph::new(db),
        }
    }

    /// Build context for a task description. `history` maps paths to the
    /// unix time of their last edit.
    pub fn build(
        &self,
        task: &str,
        options: &ContextOptions,
        history: &HashMap<String, i64>,
    ) -> Result<ContextResult> {
        let mut result = ContextResult {
            query: task.to_string(),
            keywords: extract_keywords(task),
            token_budget: options.token_budget,
            ..ContextResult::default()
        };
        if result.keywords.is_empty() {
            result.warnings.push("no searchable keywords in task".to_string());
            return Ok(result);
        }

        // Step 1: seed files from chunk search
        let hits = self
            .db
            .search_chunks(&result.keywords.join(" "), options.max_seed_hits)?;
        let (seeds, best_hits) = seeds_from_hits(hits);
        if seeds.is_empty() {
            result.warnings.push("no indexed content matched the task".to_string());
            return Ok(result);
        }

        // Step 2: rank seeds and their dependencies
        let ranked = rank_context(&self.graph, &seeds, history, &options.ranking)?;
        result.stats = ranked.stats;

        // Step 3: attach snippets, symbols and imports
        for score in ranked.files {
            let snippet = match best_hits.get(&score.path) {
                Some(hit) => Some(Snippet {
                    start_line: hit.start_line,
                    end_line: hit.end_line,
                    content: hit.content.clone(),
                }),
                None => self.db.chunks_for_file(&score.path)?.into_iter().next().map(|c| Snippet {
                    start_line: c.start_line,
                    end_line: c.end_line,
                    content: c.content,
                }),
            };

            if options.include_symbols {
                for symbol in self.db.symbols_for_file(&score.path)? {
                    let text = format!(
                        "{} {} {}",
                        symbol.kind.as_str(),
                        symbol.signature.as_deref().unwrap_or(&symbol.name),
                        symbol.doc_comment.as_deref().unwrap_or("")
                    );
                    result.symbols.push(ContextSymbol {
                        path: symbol.file_path,
                        name: symbol.name,
                        kind: symbol.kind,
                        start_line: symbol.start_line,
                        end_line: symbol.end_line,
                        signature: symbol.signature,
                        doc_comment: symbol.doc_comment,
                        tokens: estimate_tokens(&text),
                    });
                }
            }

            if options.include_imports {
                for rel in self.db.relationships_from(&score.path, RelationshipKind::Import)? {
                    let Some(module) = rel.target_symbol else {
                        continue;
                    };
                    let tokens = estimate_tokens(&format!("{} -> {}", rel.source_file, module));
                    result.imports.push(ContextImport {
                        source_file: rel.source_file,
                        module,
                        target_file: rel.target_file,
                        tokens,
                    });
                }
            }

            let tokens = estimate_tokens(&score.path)
                + snippet.as_ref().map(|s| estimate_tokens(&s.content)).unwrap_or(0);
            result.files.push(ContextFile {
                path: score.path.clone(),
                score,
                snippet,
                tokens,
            });
        }

        // Step 4: decisions scoped to the chosen files
        if options.max_decisions > 0 {
            let paths: Vec<String> = result.files.iter().map(|f| f.path.clone()).collect();
            result.decisions = self.db.decisions_for_paths(&paths, options.max_decisions)?;
        }

        apply_token_budget(&mut result, options.token_budget);
        debug!(
            files = result.files.len(),
            symbols = result.symbols.len(),
            tokens = result.total_tokens,
            "built context"
        );
        Ok(result)
    }
}

/// Best hit per file; relevance is its bm25 strength relative to the best overall
fn seeds_from_hits(hits: Vec<ChunkHit>) -> (Vec<SeedFile>, HashMap<String, ChunkHit>) {
    let mut best: HashMap<String, ChunkHit> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for hit in hits {
        // bm25 ranks are negative; lower is better
        let replace = match best.get(&hit.path) {
            Some(kept) => hit.rank < kept.rank,
            None => {
                order.push(hit.path.clone());
                true
            }
        };
        if replace {
            best.insert(hit.path.clone(), hit);
        }
    }

    let strongest = best.values().map(|h| -h.rank).fold(0.0_f64, f64::max);
    let seeds = order
        .into_iter()
        .filter_map(|path| {
            let hit = best.get(&path)?;
            let relevance = if strongest > 0.0 {
                (-hit.rank / strongest).clamp(0.0, 1.0)
            } else {
                1.0
            };
            Some(SeedFile { path, relevance })
        })
        .collect();
    (seeds, best)
}

/// Fit a result into `budget` tokens.
///
/// Decisions are kept first. When the rest does not fit, the remaining
/// budget is split 50/40/10 between files, symbols and imports, each
/// category is truncated by priority, and a warning is recorded.
pub fn apply_token_budget(result: &mut ContextResult, budget: usize) {
    result.token_budget = budget;
    let decision_tokens: Vec<usize> = result.decisions.iter().map(decision_tokens).collect();
    let file_tokens: usize = result.files.iter().map(|f| f.tokens).sum();
    let symbol_tokens: usize = result.symbols.iter().map(|s| s.tokens).sum();
    let import_tokens: usize = result.imports.iter().map(|i| i.tokens).sum();
    let total = decision_tokens.iter().sum::<usize>() + file_tokens + symbol_tokens + import_tokens;

    if total <= budget {
        result.total_tokens = total;
        return;
    }

    let decisions = truncate_to_token_budget(
        std::mem::take(&mut result.decisions)
            .into_iter()
            .zip(decision_tokens)
            .map(|(item, tokens)| BudgetItem {
                item,
                tokens,
                priority: 1.0,
            })
            .collect(),
        budget,
    );
    let remaining = budget - decisions.used_tokens;
    let file_budget = remaining * FILE_SHARE / 100;
    let symbol_budget = remaining * SYMBOL_SHARE / 100;
    let import_budget = remaining - file_budget - symbol_budget;

    let files = truncate_to_token_budget(
        std::mem::take(&mut result.files)
            .into_iter()
            .map(|f| BudgetItem {
                tokens: f.tokens,
                priority: f.score.score,
                item: f,
            })
            .collect(),
        file_budget,
    );

    // equal priorities keep input order, so symbols of surviving files go first
    let kept_paths: HashSet<&str> = files.kept.iter().map(|f| f.path.as_str()).collect();
    let mut symbols = std::mem::take(&mut result.symbols);
    symbols.sort_by_key(|s| !kept_paths.contains(s.path.as_str()));
    let symbols = truncate_to_token_budget(
        symbols
            .into_iter()
            .map(|s| BudgetItem {
                tokens: s.tokens,
                priority: symbol_priority(s.kind),
                item: s,
            })
            .collect(),
        symbol_budget,
    );
    let imports = truncate_to_token_budget(
        std::mem::take(&mut result.imports)
            .into_iter()
            .map(|i| BudgetItem {
                tokens: i.tokens,
                priority: if kept_paths.contains(i.source_file.as_str()) { 1.0 } else { 0.5 },
                item: i,
            })
            .collect(),
        import_budget,
    );

    let message = format!(
        "context exceeded token budget ({} > {}); dropped {} files, {} symbols, {} imports, {} decisions",
        total, budget, files.dropped, symbols.dropped, imports.dropped, decisions.dropped
    );
    warn!("{}", message);

    result.total_tokens =
        decisions.used_tokens + files.used_tokens + symbols.used_tokens + imports.used_tokens;
    result.decisions = decisions.kept;
    result.files = files.kept;
    result.symbols = symbols.kept;
    result.imports = imports.kept;
    result.truncated = true;
    result.warnings.push(message);
}

fn decision_tokens(decision: &Decision) -> usize {
    estimate_tokens(&decision.content) + decision.rationale.as_deref().map(estimate_tokens).unwrap_or(0)
}

/// Extract search keywords from a task description
pub fn extract_keywords(task: &str) -> Vec<String> {
    const STOP_WORDS: &[&str] = &[
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
        "can", "need", "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into",
        "through", "during", "before", "after", "above", "below", "between", "under", "again",
        "further", "then", "once", "here", "there", "when", "where", "why", "how", "all", "each",
        "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same",
        "so", "than", "too", "very", "just", "and", "but", "if", "or", "because", "until",
        "while", "this", "that", "these", "those", "what", "which", "who", "whom", "find", "get",
        "look", "see", "use", "make", "want", "fix", "add", "update", "change", "modify",
        "implement", "create", "delete", "remove",
    ];

    let mut seen = HashSet::new();
    task.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|word| {
            let lower = word.to_lowercase();
            word.chars().count() > 2 && !STOP_WORDS.contains(&lower.as_str())
        })
        .filter(|word| seen.insert(word.to_lowercase()))
        .map(|s| s.to_string())
        .collect()
}

/// Format a context result as markdown
pub fn format_context_markdown(context: &ContextResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Context: {}\n\n", context.query));
    output.push_str(&format!(
        "_{} files, ~{} of {} tokens{}_\n",
        context.files.len(),
        context.total_tokens,
        context.token_budget,
        if context.truncated { ", truncated" } else { "" }
    ));

    for warning in &context.warnings {
        output.push_str(&format!("\n> warning: {}\n", warning));
    }

    if !context.files.is_empty() {
        output.push_str("\n## Files\n\n");
        for file in &context.files {
            output.push_str(&format!(
                "### {} (score {:.2}{})\n\n",
                file.path,
                file.score.score,
                if file.score.is_seed {
                    String::new()
                } else {
                    format!(", dependency depth {}", file.score.depth)
                }
            ));
            if let Some(snippet) = &file.snippet {
                output.push_str(&format!(
                    "Lines {}-{}:\n\n```\n{}\n```\n\n",
                    snippet.start_line,
                    snippet.end_line,
                    snippet.content.trim_end()
                ));
            }
        }
    }

    if !context.symbols.is_empty() {
        output.push_str("## Symbols\n\n");
        for symbol in &context.symbols {
            output.push_str(&format!(
                "- **{}** `{}` - {}:{}-{}\n",
                symbol.kind.as_str(),
                symbol.name,
                symbol.path,
                symbol.start_line,
                symbol.end_line
            ));
            if let Some(sig) = &symbol.signature {
                output.push_str(&format!("  `{}`\n", sig));
            }
        }
        output.push('\n');
    }

    if !context.imports.is_empty() {
        output.push_str("## Imports\n\n");
        for import in &context.imports {
            match &import.target_file {
                Some(target) => output.push_str(&format!(
                    "- {} imports `{}` ({})\n",
                    import.source_file, import.module, target
                )),
                None => output.push_str(&format!("- {} imports `{}`\n", import.source_file, import.module)),
            }
        }
        output.push('\n');
    }

    if !context.decisions.is_empty() {
        output.push_str("## Decisions\n\n");
        for decision in &context.decisions {
            output.push_str(&format!("- {}", decision.content));
            if let Some(rationale) = &decision.rationale {
                output.push_str(&format!(" ({})", rationale));
            }
            if let Some(scope) = &decision.scope_path {
                output.push_str(&format!(" [{}]", scope));
            }
            output.push('\n');
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, FileAnalysis, Language, RelationshipFact, ScannedFile, SymbolNode};

    fn scanned(path: &str, content: &str, symbols: Vec<SymbolNode>, imports: &[&str]) -> ScannedFile {
        ScannedFile {
            path: path.to_string(),
            hash: format!("hash-{}", path),
            size: content.len() as u64,
            modified_at: 0,
            language: Language::detect(path),
            chunks: vec![Chunk {
                index: 0,
                start_line: 1,
                end_line: content.lines().count() as u32,
                content: content.to_string(),
            }],
            analysis: Some(FileAnalysis {
                symbols,
                relationships: imports
                    .iter()
                    .map(|m| RelationshipFact {
                        kind: RelationshipKind::Import,
                        source_symbol: None,
                        target_file: None,
                        target_symbol: Some(m.to_string()),
                        line: 1,
                        column: 0,
                    })
                    .collect(),
            }),
        }
    }

    fn symbol(name: &str, kind: SymbolKind, start: u32, end: u32) -> SymbolNode {
        SymbolNode {
            name: name.to_string(),
            kind,
            start_line: start,
            end_line: end,
            signature: Some(format!("{} {}", kind.as_str(), name)),
            doc_comment: None,
            exported: true,
            children: Vec::new(),
        }
    }

    fn indexed_db() -> Database {
        let mut db = Database::in_memory().unwrap();
        db.write(|w| {
            w.insert_scanned_file(
                &scanned(
                    "src/auth/session.ts",
                    "import { hash } from './crypto';\nexport function validateSession(token) {\n  return hash(token);\n}\n",
                    vec![symbol("validateSession", SymbolKind::Function, 2, 4)],
                    &["./crypto"],
                ),
                0,
            )?;
            w.insert_scanned_file(
                &scanned(
                    "src/auth/crypto.ts",
                    "export function hash(value) {\n  return value;\n}\n",
                    vec![symbol("hash", SymbolKind::Function, 1, 3)],
                    &[],
                ),
                0,
            )?;
            w.insert_scanned_file(
                &scanned("README.md", "# Project\nNothing about sessions here.\n", Vec::new(), &[]),
                0,
            )?;
            w.resolve_import_targets()?;
            w.record_decision("tokens expire after one hour", Some("security review"), Some("src/auth"), 10)?;
            w.record_decision("frontend uses css grid", None, Some("web"), 11)?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_extract_keywords() {
        assert_eq!(
            extract_keywords("Fix the session validation in the auth module, and the Session cache"),
            vec!["session", "validation", "auth", "module", "cache"]
        );
        assert!(extract_keywords("fix it to be so").is_empty());
    }

    #[test]
    fn test_build_context() {
        let db = indexed_db();
        let builder = ContextBuilder::new(&db);
        let result = builder
            .build("validateSession token handling", &ContextOptions::default(), &HashMap::new())
            .unwrap();

        let session = result.files.iter().find(|f| f.path == "src/auth/session.ts").unwrap();
        assert!(session.score.is_seed);
        assert_eq!(session.score.relevance, 1.0);
        assert!(session.snippet.is_some());
        assert!(result.files.iter().all(|f| f.path != "README.md"));

        let crypto = result.files.iter().find(|f| f.path == "src/auth/crypto.ts").unwrap();
        assert!(!crypto.score.is_seed);
        assert_eq!(crypto.score.depth, 1);

        assert!(result.symbols.iter().any(|s| s.name == "validateSession"));
        assert_eq!(result.imports[0].target_file.as_deref(), Some("src/auth/crypto.ts"));
        assert_eq!(result.decisions.len(), 1);
        assert_eq!(result.decisions[0].content, "tokens expire after one hour");
        assert!(!result.truncated);
        assert!(result.total_tokens <= result.token_budget);
    }

    #[test]
    fn test_budget_truncates_with_warning() {
        let db = indexed_db();
        let builder = ContextBuilder::new(&db);
        let options = ContextOptions {
            token_budget: 30,
            ..ContextOptions::default()
        };
        let result = builder
            .build("validateSession token handling", &options, &HashMap::new())
            .unwrap();

        assert!(result.truncated);
        assert!(result.total_tokens <= 30);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("token budget"));
    }

    #[test]
    fn test_no_matches() {
        let db = indexed_db();
        let builder = ContextBuilder::new(&db);
        let result = builder
            .build("kubernetes helm charts", &ContextOptions::default(), &HashMap::new())
            .unwrap();
        assert!(result.files.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_apply_budget_split() {
        let file = |path: &str, tokens: usize, score: f64| ContextFile {
            path: path.to_string(),
            score: ContextScore {
                path: path.to_string(),
                relevance: score,
                usage: 0.0,
                recency: 0.0,
                dependency: 1.0,
                score,
                depth: 0,
                is_seed: true,
            },
            snippet: None,
            tokens,
        };
        let sym = |name: &str, kind: SymbolKind, tokens: usize| ContextSymbol {
            path: "a.rs".to_string(),
            name: name.to_string(),
            kind,
            start_line: 1,
            end_line: 2,
            signature: None,
            doc_comment: None,
            tokens,
        };
        let mut result = ContextResult {
            files: vec![file("a.rs", 40, 0.9), file("b.rs", 40, 0.5)],
            symbols: vec![sym("CONST", SymbolKind::Constant, 30), sym("run", SymbolKind::Function, 30)],
            imports: vec![ContextImport {
                source_file: "a.rs".to_string(),
                module: "std::fs".to_string(),
                target_file: None,
                tokens: 5,
            }],
            ..ContextResult::default()
        };

        apply_token_budget(&mut result, 100);

        // 50 for files, 40 for symbols, 10 for imports
        assert_eq!(result.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(), vec!["a.rs"]);
        assert_eq!(result.symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["run"]);
        assert_eq!(result.imports.len(), 1);
        assert_eq!(result.total_tokens, 75);
        assert!(result.truncated);
    }

    #[test]
    fn test_budget_prefers_symbols_of_kept_files() {
        let seed = |path: &str, score: f64| ContextFile {
            path: path.to_string(),
            score: ContextScore {
                path: path.to_string(),
                relevance: score,
                usage: 0.0,
                recency: 0.0,
                dependency: 1.0,
                score,
                depth: 0,
                is_seed: true,
            },
            snippet: None,
            tokens: 50,
        };
        let function = |path: &str, name: &str| ContextSymbol {
            path: path.to_string(),
            name: name.to_string(),
            kind: SymbolKind::Function,
            start_line: 1,
            end_line: 2,
            signature: None,
            doc_comment: None,
            tokens: 40,
        };
        let mut result = ContextResult {
            files: vec![seed("kept.rs", 0.9), seed("dropped.rs", 0.4)],
            // the dropped file's function is listed first
            symbols: vec![function("dropped.rs", "lost"), function("kept.rs", "found")],
            ..ContextResult::default()
        };

        apply_token_budget(&mut result, 100);

        assert_eq!(result.files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(), vec!["kept.rs"]);
        assert_eq!(result.symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["found"]);
        assert_eq!(result.total_tokens, 90);
    }

    #[test]
    fn test_markdown_rendering() {
        let db = indexed_db();
        let builder = ContextBuilder::new(&db);
        let result = builder
            .build("validateSession", &ContextOptions::default(), &HashMap::new())
            .unwrap();
        let md = format_context_markdown(&result);

        assert!(md.starts_with("# Context: validateSession"));
        assert!(md.contains("### src/auth/session.ts"));
        assert!(md.contains("## Symbols"));
        assert!(md.contains("## Decisions"));
    }
}
