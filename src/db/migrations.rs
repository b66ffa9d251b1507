//! Versioned schema migrations
//!
//! Steps are only ever appended. Each one runs once, in order, inside its own
//! transaction, and records its version in `schema_version`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::schema;
use crate::error::PalaceError;

/// A single schema step
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    apply: fn(&Connection) -> Result<()>,
}

/// Ordered list of every schema step
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "core index tables",
        apply: create_core_tables,
    },
    Migration {
        version: 2,
        description: "scans.commit_hash",
        apply: add_scan_commit_hash,
    },
    Migration {
        version: 3,
        description: "decisions, sessions and rooms",
        apply: create_memory_tables,
    },
    Migration {
        version: 4,
        description: "relationship target indexes",
        apply: create_relationship_indexes,
    },
];

fn create_core_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(schema::CORE_SCHEMA)?;
    Ok(())
}

fn add_scan_commit_hash(conn: &Connection) -> Result<()> {
    add_column_tolerant(conn, "scans", "commit_hash", "TEXT")
}

fn create_memory_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(schema::MEMORY_SCHEMA)?;
    Ok(())
}

fn create_relationship_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(schema::RELATIONSHIP_INDEXES)?;
    Ok(())
}

/// Highest version known to this build
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Highest applied version, or -1 when nothing has been applied
pub fn current_version(conn: &Connection) -> Result<i64> {
    ensure_version_table(conn)?;
    let version: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version.unwrap_or(-1))
}

/// Apply every migration newer than the stored version
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let existing = current_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > existing) {
        run_one(conn, migration).map_err(|e| PalaceError::Migration {
            version: migration.version,
            message: format!("{:#}", e),
        })?;
        info!(
            version = migration.version,
            "applied migration: {}", migration.description
        );
    }

    Ok(())
}

fn run_one(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn.transaction()?;
    (migration.apply)(&tx)?;
    tx.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        params![migration.version, crate::types::unix_now()],
    )?;
    tx.commit()?;
    Ok(())
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        );",
    )
    .context("failed to create schema_version table")?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `ALTER TABLE ... ADD COLUMN` that treats an existing column as success
pub fn add_column_tolerant(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    if has_column(conn, table, column)? {
        debug!(table, column, "column already present");
        return Ok(());
    }
    let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(e) if e.to_string().contains("duplicate column name") => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to add {}.{}", table, column)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_latest() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), -1);

        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        assert!(has_column(&conn, "scans", "commit_hash").unwrap());
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_add_column_tolerates_duplicates() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER);").unwrap();

        add_column_tolerant(&conn, "t", "b", "TEXT").unwrap();
        add_column_tolerant(&conn, "t", "b", "TEXT").unwrap();
        assert!(has_column(&conn, "t", "b").unwrap());
    }

    #[test]
    fn test_partial_database_resumes() {
        let mut conn = Connection::open_in_memory().unwrap();
        ensure_version_table(&conn).unwrap();
        run_one(&mut conn, &MIGRATIONS[0]).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);

        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }
}
