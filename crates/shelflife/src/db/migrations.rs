//! Database migration system.
//!
//! SQL files under `sql/` are applied in version order and recorded in
//! `_migrations`.

use rusqlite::Connection;

use super::error::DatabaseError;

/// One schema step. `guard` lets a step be skipped on databases that
/// already carry its change.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    guard: Guard,
}

enum Guard {
    Always,
    /// Applied only while `table.column` is missing.
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_receipts_table",
        sql: include_str!("sql/001_create_receipts.sql"),
        guard: Guard::Always,
    },
    Migration {
        version: 2,
        description: "create_inventory_items_table",
        sql: include_str!("sql/002_create_inventory_items.sql"),
        guard: Guard::Always,
    },
    Migration {
        version: 3,
        description: "add_currency_to_receipts",
        sql: include_str!("sql/003_add_currency.sql"),
        guard: Guard::MissingColumn {
            table: "receipts",
            column: "currency",
        },
    },
    Migration {
        version: 4,
        description: "add_expiry_confidence_to_inventory_items",
        sql: include_str!("sql/004_add_expiry_confidence.sql"),
        guard: Guard::MissingColumn {
            table: "inventory_items",
            column: "expiry_confidence",
        },
    },
];

const CREATE_TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// Brings the schema up to date. Each step and its `_migrations` row commit
/// together, so a failed step leaves the database at the previous version.
///
/// Returns how many steps were recorded.
pub fn run_all(conn: &Connection) -> Result<usize, DatabaseError> {
    conn.execute_batch(CREATE_TRACKING_TABLE)?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        log::debug!("Schema is current at v{}", current);
        return Ok(0);
    }

    for migration in &pending {
        apply(conn, migration)?;
    }

    log::info!(
        "Schema migrated from v{} to v{}",
        current,
        pending.last().map(|m| m.version).unwrap_or(current)
    );
    Ok(pending.len())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction()?;

    let needed = match &migration.guard {
        Guard::Always => true,
        Guard::MissingColumn { table, column } => !column_exists(&tx, table, column)?,
    };
    if needed {
        log::info!("Applying migration v{}: {}", migration.version, migration.description);
        tx.execute_batch(migration.sql).map_err(failed)?;
    } else {
        log::info!(
            "Migration v{} already reflected in schema, recording only",
            migration.version
        );
    }

    tx.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )
    .map_err(failed)?;
    tx.commit()?;
    Ok(())
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}
