//! Command implementations for CLI operations

use std::collections::HashMap;

use anyhow::Result;

use crate::context::{format_context_markdown, ContextBuilder, ContextOptions};
use crate::graph::{
    clamp_depth, CallChainConfig, CallChainNode, ChainDirection, DependencyConfig, DependencyDirection, Graph,
};
use crate::indexer::Indexer;

use super::db_utils::{open_existing_database, open_project_database, project_config};

/// Run a full scan of the project at `path`
pub fn index_command(path: &str) -> Result<()> {
    let config = project_config(path)?;
    let mut db = open_project_database(&config)?;
    let summary = Indexer::new(config.clone()).full_scan(&mut db)?;

    println!("\nIndexing complete!");
    println!("  Files:         {}", summary.file_count);
    println!("  Chunks:        {}", summary.chunk_count);
    println!("  Symbols:       {}", summary.symbol_count);
    println!("  Relationships: {}", summary.relationship_count);
    if let Some(commit) = &summary.commit_hash {
        println!("  Commit:        {}", commit);
    }
    println!("  Summary:       {}", config.summary_path().display());

    Ok(())
}

/// Re-index only the files that changed since the last scan
pub fn update_command(path: &str) -> Result<()> {
    let config = project_config(path)?;
    let mut db = open_project_database(&config)?;
    let summary = Indexer::new(config).incremental(&mut db)?;

    println!("\nUpdate complete!");
    println!("  Added:     {}", summary.added);
    println!("  Modified:  {}", summary.modified);
    println!("  Deleted:   {}", summary.deleted);
    println!("  Unchanged: {}", summary.unchanged);
    if summary.resolved_imports > 0 {
        println!("  Imports resolved: {}", summary.resolved_imports);
    }

    Ok(())
}

/// Show index statistics for a project
pub fn status_command(path: &str) -> Result<()> {
    let config = project_config(path)?;
    let db = open_existing_database(&config)?;
    let stats = db.get_stats()?;

    println!("palace Index Status");
    println!("===================");
    println!("Database: {}", config.database_path().display());
    println!("Schema version: {}", stats.schema_version);
    println!("Files: {}", stats.total_files);
    println!("Chunks: {}", stats.total_chunks);
    println!("Symbols: {}", stats.total_symbols);
    println!("Relationships: {}", stats.total_relationships);
    println!("Size: {:.2} KB", stats.db_size_bytes as f64 / 1024.0);

    if let Some(scan) = db.latest_scan()? {
        println!("\nLast full scan: #{} ({} files)", scan.id, scan.file_count);
        println!("  Hash: {}", scan.scan_hash);
        if let Some(commit) = &scan.commit_hash {
            println!("  Commit: {}", commit);
        }
    }

    if !stats.languages.is_empty() {
        println!("\nLanguages:");
        for (lang, count) in &stats.languages {
            println!("  {}: {} files", lang.as_str(), count);
        }
    }

    if !stats.symbol_kinds.is_empty() {
        println!("\nSymbol Types:");
        for (kind, count) in &stats.symbol_kinds {
            println!("  {}: {}", kind.as_str(), count);
        }
    }

    Ok(())
}

/// Search symbols, then chunk content
pub fn search_command(path: &str, query: &str) -> Result<()> {
    let config = project_config(path)?;
    let db = open_existing_database(&config)?;

    let symbols = db.search_symbols(query, 20)?;
    let hits = db.search_chunks(query, 10)?;
    if symbols.is_empty() && hits.is_empty() {
        println!("Nothing found matching '{}'", query);
        return Ok(());
    }

    if !symbols.is_empty() {
        println!("Found {} symbols matching '{}':\n", symbols.len(), query);
        for symbol in symbols {
            println!(
                "  {} {} - {}:{}",
                symbol.kind.as_str(),
                symbol.name,
                symbol.file_path,
                symbol.start_line
            );
            if let Some(ref sig) = symbol.signature {
                let sig = sig.lines().next().unwrap_or(sig);
                if sig.chars().count() > 80 {
                    println!("    {}...", sig.chars().take(80).collect::<String>());
                } else {
                    println!("    {}", sig);
                }
            }
        }
    }

    if !hits.is_empty() {
        println!("\nContent matches:\n");
        for hit in hits {
            println!("  {}:{}-{}", hit.path, hit.start_line, hit.end_line);
        }
    }

    Ok(())
}

/// Direct callers of a symbol
pub fn callers_command(path: &str, symbol: &str) -> Result<()> {
    let config = project_config(path)?;
    let db = open_existing_database(&config)?;
    let sites = Graph::new(&db).incoming_calls(symbol)?;

    if sites.is_empty() {
        println!("No callers found for '{}'", symbol);
        return Ok(());
    }
    println!("{} call sites of '{}':\n", sites.len(), symbol);
    for site in sites {
        println!(
            "  {}:{}:{}  {} -> {}",
            site.file,
            site.line,
            site.column,
            site.caller_symbol.as_deref().unwrap_or("<top level>"),
            site.callee
        );
    }
    Ok(())
}

/// Direct callees of a symbol
pub fn callees_command(path: &str, symbol: &str) -> Result<()> {
    let config = project_config(path)?;
    let db = open_existing_database(&config)?;
    let sites = Graph::new(&db).outgoing_calls(symbol)?;

    if sites.is_empty() {
        println!("No calls found inside '{}'", symbol);
        return Ok(());
    }
    println!("'{}' makes {} calls:\n", symbol, sites.len());
    for site in sites {
        println!("  {}:{}:{}  {}", site.file, site.line, site.column, site.callee);
    }
    Ok(())
}

/// Recursive call chain printed as an indented tree
pub fn chain_command(path: &str, symbol: &str, direction: ChainDirection, depth: u32) -> Result<()> {
    let config = project_config(path)?;
    let db = open_existing_database(&config)?;
    let result = Graph::new(&db).call_chain(
        symbol,
        direction,
        &CallChainConfig {
            max_depth: clamp_depth(depth),
            ..CallChainConfig::default()
        },
    )?;

    for tree in &result.trees {
        println!("\n{} ({}):", symbol, tree.direction.as_str());
        print_tree(&tree.root);
    }
    println!(
        "\n{} paths, max depth {}{}",
        result.paths,
        result.max_depth,
        if result.truncated { " (truncated)" } else { "" }
    );
    Ok(())
}

fn print_tree(root: &CallChainNode) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let location = match (&node.file, node.line) {
            (Some(file), Some(line)) => format!("  ({}:{})", file, line),
            _ => String::new(),
        };
        println!("{}{}{}", "  ".repeat(node.depth as usize), node.symbol, location);
        stack.extend(node.children.iter().rev());
    }
}

/// Import dependencies of a file
pub fn deps_command(path: &str, file: &str, depth: u32) -> Result<()> {
    let config = project_config(path)?;
    let db = open_existing_database(&config)?;
    let expansion = Graph::new(&db).expand_with_dependencies(
        &[file.to_string()],
        &DependencyConfig {
            max_depth: clamp_depth(depth),
            include_importers: true,
            ..DependencyConfig::default()
        },
    )?;

    for entry in &expansion.files {
        let relation = match entry.direction {
            DependencyDirection::Seed => String::new(),
            DependencyDirection::Imports => {
                format!("  <- imported by {}", entry.via.as_deref().unwrap_or("?"))
            }
            DependencyDirection::ImportedBy => {
                format!("  -> imports {}", entry.via.as_deref().unwrap_or("?"))
            }
        };
        println!("{}{}{}", "  ".repeat(entry.depth as usize), entry.path, relation);
    }
    if expansion.truncated {
        println!("\n(truncated at {} files)", expansion.files.len());
    }
    Ok(())
}

/// Build AI context for a task
pub fn context_command(path: &str, task: &str) -> Result<()> {
    let config = project_config(path)?;
    let db = open_existing_database(&config)?;

    // file modification times stand in for an edit history
    let history: HashMap<String, i64> = db
        .list_files()?
        .into_iter()
        .map(|f| (f.path, f.modified_at))
        .collect();

    let context = ContextBuilder::new(&db).build(task, &ContextOptions::default(), &history)?;
    println!("{}", format_context_markdown(&context));

    Ok(())
}
