//! CLI command implementations
//!
//! Handles all command-line interface operations:
//! - index / update: full and incremental builds
//! - status: index statistics
//! - search, callers, callees, chain, deps: queries
//! - context: token-budgeted context for a task

mod commands;
mod db_utils;

pub use commands::*;
pub use db_utils::*;
