//! palace: codebase index and context-ranking engine
//!
//! Usage:
//!   palace index [path]                      Full scan of a codebase
//!   palace update [path]                     Re-index changed files only
//!   palace status [path]                     Show index statistics
//!   palace search <query>                    Search symbols and content
//!   palace callers <symbol>                  Direct callers of a symbol
//!   palace callees <symbol>                  Direct callees of a symbol
//!   palace chain <symbol> [up|down|both] [depth]
//!   palace deps <file> [depth]               Import dependencies of a file
//!   palace context <task>                    Build context for a task
//!
//! `--root <path>` (or `-C <path>`) points any command at another project.

use std::env;

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;

use palace::cli::{
    callees_command, callers_command, chain_command, context_command, deps_command, index_command,
    search_command, status_command, update_command,
};
use palace::graph::{ChainDirection, DEFAULT_MAX_DEPTH};

fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let verbose = args.iter().any(|a| a == "-v" || a == "--verbose");
    args.retain(|a| a != "-v" && a != "--verbose");

    setup_logging(verbose || env::var("PALACE_DEBUG").is_ok_and(|v| v == "1"));
    let root = take_root(&mut args)?;

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let path = root.as_deref().unwrap_or(".");
    match args[1].as_str() {
        "index" => {
            let path = args.get(2).map(|s| s.as_str()).unwrap_or(path);
            index_command(path)?;
        }
        "update" => {
            let path = args.get(2).map(|s| s.as_str()).unwrap_or(path);
            update_command(path)?;
        }
        "status" => {
            let path = args.get(2).map(|s| s.as_str()).unwrap_or(path);
            status_command(path)?;
        }
        "search" => {
            if args.len() < 3 {
                eprintln!("Usage: palace search <query>");
                return Ok(());
            }
            search_command(path, &args[2..].join(" "))?;
        }
        "callers" => {
            let Some(symbol) = args.get(2) else {
                eprintln!("Usage: palace callers <symbol>");
                return Ok(());
            };
            callers_command(path, symbol)?;
        }
        "callees" => {
            let Some(symbol) = args.get(2) else {
                eprintln!("Usage: palace callees <symbol>");
                return Ok(());
            };
            callees_command(path, symbol)?;
        }
        "chain" => {
            let Some(symbol) = args.get(2) else {
                eprintln!("Usage: palace chain <symbol> [up|down|both] [depth]");
                return Ok(());
            };
            let direction = match args.get(3) {
                Some(name) => match ChainDirection::from_name(name) {
                    Some(d) => d,
                    None => bail!("unknown direction '{}'; expected up, down or both", name),
                },
                None => ChainDirection::Up,
            };
            let depth = parse_depth(args.get(4))?;
            chain_command(path, symbol, direction, depth)?;
        }
        "deps" => {
            let Some(file) = args.get(2) else {
                eprintln!("Usage: palace deps <file> [depth]");
                return Ok(());
            };
            let depth = parse_depth(args.get(3))?;
            deps_command(path, file, depth)?;
        }
        "context" => {
            if args.len() < 3 {
                eprintln!("Usage: palace context <task>");
                return Ok(());
            }
            let task = args[2..].join(" ");
            context_command(path, &task)?;
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        "--version" | "-V" | "version" => {
            print_version();
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
        }
    }

    Ok(())
}

/// Remove `--root <path>` / `-C <path>` from `args`, returning the path
fn take_root(args: &mut Vec<String>) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == "--root" || a == "-C") else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} needs a path", args[pos]);
    }
    let root = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(root))
}

fn parse_depth(arg: Option<&String>) -> Result<u32> {
    match arg {
        Some(raw) => match raw.parse::<u32>() {
            Ok(depth) => Ok(depth),
            Err(_) => bail!("depth must be a number, got '{}'", raw),
        },
        None => Ok(DEFAULT_MAX_DEPTH),
    }
}

fn print_usage() {
    println!(
        r#"palace: codebase index and context-ranking engine

USAGE:
    palace [-v] [--root <path>] <COMMAND> [ARGS]

COMMANDS:
    index [path]                      Full scan (default: current directory)
    update [path]                     Re-index only changed files
    status [path]                     Show index statistics
    search <query>                    Search symbols and file content
    callers <symbol>                  Direct callers of a symbol
    callees <symbol>                  Calls made inside a symbol
    chain <symbol> [up|down|both] [depth]
                                      Recursive call chain (default: up, depth 3)
    deps <file> [depth]               Import dependencies and importers of a file
    context <task>                    Build token-budgeted context for a task
    help                              Show this help message
    version                           Show the version

OPTIONS:
    -C, --root <path>                 Project to query (default: current directory)
    -v, --verbose                     Debug logging

ENVIRONMENT:
    RUST_LOG                 Log filter (default: info)
    PALACE_DEBUG=1           Debug logging, same as -v
    PALACE_WORKERS           Scan worker count
    PALACE_MAX_FILE_SIZE     Largest indexed file, in bytes
    PALACE_DB_NAME           Database name under .palace/index/

EXAMPLES:
    palace index                           # Index current directory
    palace chain handle_request down 4     # What handle_request reaches
    palace deps src/server.rs 2            # Imports two levels out
    palace context "add user login"        # Context for implementing login
    palace --root ../api callers connect   # Query another project
"#
    );
}

fn print_version() {
    println!("palace {}", env!("CARGO_PKG_VERSION"));
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
