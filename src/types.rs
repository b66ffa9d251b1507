//! Core type definitions for palace
//!
//! Defines the fundamental types for representing an indexed workspace:
//! - Files and chunks: what is on disk and how it is split for retrieval
//! - Symbols: named structural units forming a tree per file
//! - Relationships: calls, imports and references between files and symbols
//! - Scans: provenance of a full index build

use serde::{Deserialize, Serialize};

/// Represents the kind of code symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Module,
    Class,
    Struct,
    Interface,
    Trait,
    Enum,
    TypeAlias,
    Function,
    Method,
    Constant,
    Variable,
    Field,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Enum => "enum",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Constant => "constant",
            SymbolKind::Variable => "variable",
            SymbolKind::Field => "field",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "module" => Some(SymbolKind::Module),
            "class" => Some(SymbolKind::Class),
            "struct" => Some(SymbolKind::Struct),
            "interface" => Some(SymbolKind::Interface),
            "trait" => Some(SymbolKind::Trait),
            "enum" => Some(SymbolKind::Enum),
            "type_alias" => Some(SymbolKind::TypeAlias),
            "function" => Some(SymbolKind::Function),
            "method" => Some(SymbolKind::Method),
            "constant" => Some(SymbolKind::Constant),
            "variable" => Some(SymbolKind::Variable),
            "field" => Some(SymbolKind::Field),
            _ => None,
        }
    }

    /// Functions and methods: the only kinds that enclose call sites
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }

    /// Type-like kinds whose nested functions are methods
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Struct
                | SymbolKind::Interface
                | SymbolKind::Trait
                | SymbolKind::Enum
        )
    }
}

/// Represents the kind of relationship between files and symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Source file imports target module/file
    Import,
    /// Source symbol calls target function/method
    Call,
    /// Source references target symbol
    Reference,
    /// Source extends target (inheritance)
    Extends,
    /// Source implements target interface/trait
    Implements,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Import => "import",
            RelationshipKind::Call => "call",
            RelationshipKind::Reference => "reference",
            RelationshipKind::Extends => "extends",
            RelationshipKind::Implements => "implements",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "import" => Some(RelationshipKind::Import),
            "call" => Some(RelationshipKind::Call),
            "reference" => Some(RelationshipKind::Reference),
            "extends" => Some(RelationshipKind::Extends),
            "implements" => Some(RelationshipKind::Implements),
            _ => None,
        }
    }
}

/// Detected file languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Tsx,
    Jsx,
    Python,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Php,
    Ruby,
    Swift,
    Kotlin,
    Markdown,
    Json,
    Yaml,
    Toml,
    Shell,
    Sql,
    Unknown,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "jsx" => Language::Jsx,
            "py" | "pyi" => Language::Python,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "php" => Language::Php,
            "rb" => Language::Ruby,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "md" | "markdown" => Language::Markdown,
            "json" | "jsonc" => Language::Json,
            "yml" | "yaml" => Language::Yaml,
            "toml" => Language::Toml,
            "sh" | "bash" | "zsh" => Language::Shell,
            "sql" => Language::Sql,
            _ => Language::Unknown,
        }
    }

    /// Detect a language from a path, using well-known file names before extensions
    pub fn detect(path: &str) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name {
            "Makefile" | "Dockerfile" | "Justfile" => return Language::Shell,
            "Cargo.lock" | "Pipfile" => return Language::Toml,
            _ => {}
        }
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => Language::Unknown,
        }
    }

    /// Parse the stored name produced by [`Language::as_str`]
    pub fn from_name(name: &str) -> Self {
        match name {
            "rust" => Language::Rust,
            "typescript" => Language::TypeScript,
            "javascript" => Language::JavaScript,
            "tsx" => Language::Tsx,
            "jsx" => Language::Jsx,
            "python" => Language::Python,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" => Language::Cpp,
            "csharp" => Language::CSharp,
            "php" => Language::Php,
            "ruby" => Language::Ruby,
            "swift" => Language::Swift,
            "kotlin" => Language::Kotlin,
            "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yaml" => Language::Yaml,
            "toml" => Language::Toml,
            "shell" => Language::Shell,
            "sql" => Language::Sql,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Tsx => "tsx",
            Language::Jsx => "jsx",
            Language::Python => "python",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Shell => "shell",
            Language::Sql => "sql",
            Language::Unknown => "unknown",
        }
    }
}

/// Metadata about an indexed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub hash: String,
    pub size: u64,
    /// Modification time, unix seconds
    pub modified_at: i64,
    /// When the row was written, unix seconds
    pub indexed_at: i64,
    pub language: Language,
}

/// A line-aligned window of file content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
}

/// A symbol as produced by an analyzer: nested children instead of parent ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub exported: bool,
    pub children: Vec<SymbolNode>,
}

impl SymbolNode {
    /// Number of symbols in this subtree, including self
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(SymbolNode::count).sum::<usize>()
    }
}

/// A stored symbol row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: i64,
    pub file_path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: u32,
    pub end_line: u32,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub parent_id: Option<i64>,
    pub exported: bool,
}

/// A relationship as produced by an analyzer; the source file is implied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipFact {
    pub kind: RelationshipKind,
    pub source_symbol: Option<String>,
    pub target_file: Option<String>,
    pub target_symbol: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// A stored relationship row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub kind: RelationshipKind,
    pub source_file: String,
    pub source_symbol: Option<String>,
    pub target_file: Option<String>,
    pub target_symbol: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// Structural facts for one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub symbols: Vec<SymbolNode>,
    pub relationships: Vec<RelationshipFact>,
}

impl FileAnalysis {
    pub fn symbol_count(&self) -> usize {
        self.symbols.iter().map(SymbolNode::count).sum()
    }
}

/// Everything the scanner learned about one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedFile {
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub modified_at: i64,
    pub language: Language,
    pub chunks: Vec<Chunk>,
    pub analysis: Option<FileAnalysis>,
}

/// Provenance of one full scan; stored in `scans` and written as the JSON summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: i64,
    pub root_path: String,
    pub scan_hash: String,
    pub commit_hash: Option<String>,
    pub started_at: i64,
    pub completed_at: i64,
    pub file_count: u64,
    pub chunk_count: u64,
    pub symbol_count: u64,
    pub relationship_count: u64,
}

/// Full-text hit against the chunk mirror
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub path: String,
    pub chunk_index: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    /// bm25 rank as reported by FTS5 (lower is better)
    pub rank: f64,
}

/// An architectural decision recorded by the memory subsystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub id: i64,
    pub content: String,
    pub rationale: Option<String>,
    pub scope_path: Option<String>,
    pub created_at: i64,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: u64,
    pub total_chunks: u64,
    pub total_symbols: u64,
    pub total_relationships: u64,
    pub db_size_bytes: u64,
    pub schema_version: i64,
    pub languages: Vec<(Language, u64)>,
    pub symbol_kinds: Vec<(SymbolKind, u64)>,
}

/// Current time as unix seconds
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
