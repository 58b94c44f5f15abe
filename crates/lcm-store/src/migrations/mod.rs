//! Schema migration runner for the ledger database.
//!
//! Migrations are embedded at compile time via [`include_str!`] and executed
//! in version order, each inside its own transaction. The `schema_version`
//! table tracks which versions have been applied; already-applied versions
//! are skipped.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{LedgerError, Result};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Ledger tables: conversations, messages, summaries, edges, context items",
    sql: include_str!("v001_schema.sql"),
}];

/// Run all pending migrations on the given connection.
///
/// Returns the number of migrations applied.
///
/// # Errors
///
/// Returns [`LedgerError::Migration`] if any migration SQL fails.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied, skipping");
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        apply_migration(conn, migration)?;
        applied += 1;
    }

    Ok(applied)
}

/// Return the highest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| LedgerError::Migration {
        message: format!("failed to read schema_version: {e}"),
    })
}

/// Tables every ledger must have.
pub const LEDGER_TABLES: &[&str] = &[
    "conversations",
    "messages",
    "summaries",
    "summary_messages",
    "summary_parents",
    "context_items",
];

/// Ledger tables absent from the database. Reads `sqlite_master` only.
pub fn missing_tables(conn: &Connection) -> Result<Vec<&'static str>> {
    let mut stmt =
        conn.prepare("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in LEDGER_TABLES {
        let count: i64 = stmt.query_row([*table], |row| row.get(0))?;
        if count == 0 {
            missing.push(*table);
        }
    }
    Ok(missing)
}

/// Return the latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| LedgerError::Migration {
        message: format!("failed to create schema_version table: {e}"),
    })
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let fail = |stage: &str, e: rusqlite::Error| LedgerError::Migration {
        message: format!(
            "v{} ({}) {stage}: {e}",
            migration.version, migration.description
        ),
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| fail("begin", e))?;
    tx.execute_batch(migration.sql)
        .map_err(|e| fail("execute", e))?;
    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description) \
             VALUES (?1, datetime('now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(|e| fail("record version", e))?;
    tx.commit().map_err(|e| fail("commit", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn run_migrations_creates_all_tables() {
        let conn = open_memory();
        assert_eq!(run_migrations(&conn).unwrap(), 1);

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .filter(|name: &String| !name.starts_with("sqlite_"))
            .collect();

        assert_eq!(
            tables,
            [
                "context_items",
                "conversations",
                "messages",
                "schema_version",
                "summaries",
                "summary_messages",
                "summary_parents",
            ]
        );
    }

    #[test]
    fn missing_tables_lists_absent_ledger_tables() {
        let conn = open_memory();
        assert_eq!(missing_tables(&conn).unwrap(), LEDGER_TABLES);

        run_migrations(&conn).unwrap();
        assert!(missing_tables(&conn).unwrap().is_empty());

        conn.execute_batch("DROP TABLE context_items;").unwrap();
        assert_eq!(missing_tables(&conn).unwrap(), ["context_items"]);
    }

    #[test]
    fn run_migrations_is_idempotent() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn adopts_tables_created_by_runtime() {
        let conn = open_memory();
        conn.execute_batch(include_str!("v001_schema.sql")).unwrap();
        conn.execute("INSERT INTO conversations (session_id) VALUES ('s1')", [])
            .unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), 1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn context_item_reference_must_match_type() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO conversations (session_id) VALUES ('s1')", [])
            .unwrap();

        let err = conn.execute(
            "INSERT INTO context_items (conversation_id, ordinal, item_type, message_id) \
             VALUES (1, 0, 'summary', NULL)",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn context_item_ordinal_is_unique_per_conversation() {
        let conn = open_memory();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO conversations (session_id) VALUES ('s1');
             INSERT INTO messages (conversation_id, role, content) VALUES (1, 'user', 'a');
             INSERT INTO messages (conversation_id, role, content) VALUES (1, 'user', 'b');
             INSERT INTO context_items (conversation_id, ordinal, item_type, message_id)
               VALUES (1, 0, 'message', 1);",
        )
        .unwrap();

        let dup = conn.execute(
            "INSERT INTO context_items (conversation_id, ordinal, item_type, message_id) \
             VALUES (1, 0, 'message', 2)",
            [],
        );
        assert!(dup.is_err());
    }
}
