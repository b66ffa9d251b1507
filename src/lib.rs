//! palace: index and context-ranking engine
//!
//! Indexes a source tree into files, chunks, symbols and call/import
//! relationships stored in SQLite, then answers retrieval questions on top
//! of those facts.
//!
//! ## Features
//!
//! - Parallel scan pipeline with incremental change detection (content hashes or git)
//! - Tree-sitter analysis for Rust, TypeScript, JavaScript, Python, Go, Java, C, C++
//! - Call chains and import-dependency expansion
//! - Usage and centrality scoring
//! - Smart context ranking with token-budget truncation

pub mod changes;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod indexer;
pub mod scanner;
pub mod tokens;
pub mod types;
pub mod usage;

pub use config::IndexConfig;
pub use context::{ContextBuilder, ContextOptions, ContextResult};
pub use db::Database;
pub use error::PalaceError;
pub use graph::Graph;
pub use indexer::Indexer;
