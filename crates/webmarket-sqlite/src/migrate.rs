//! Database migration runner
//!
//! Schema files live in `migrations/` and are embedded at build time. A file's
//! version is the numeric prefix of its name (`001_create_record_tables.sql` is
//! version `001`). Each pending file runs in its own transaction together with
//! the `schema_migrations` row that records it.
//!
//! A database that has applied a version this build does not know was written by a
//! newer build; opening it fails rather than guessing at its layout.

use std::collections::BTreeSet;
use std::time::Instant;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, SqliteError};

/// One embedded schema file.
struct Migration {
    file: &'static str,
    sql: &'static str,
}

impl Migration {
    /// Numeric prefix of the file name.
    fn version(&self) -> &'static str {
        let end = self
            .file
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.file.len());
        &self.file[..end]
    }
}

macro_rules! migration {
    ($file:literal) => {
        Migration {
            file: $file,
            sql: include_str!(concat!("../migrations/", $file)),
        }
    };
}

/// Embedded migrations, in the order they apply.
const MIGRATIONS: &[Migration] = &[
    migration!("000_create_schema_migrations.sql"),
    migration!("001_create_record_tables.sql"),
];

/// Apply all pending migrations to the database.
///
/// Also turns on foreign key enforcement for the connection; deleting a database
/// row cascades through its collections and records.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON")?;

    let applied = applied_versions(conn)?;
    if let Some(unknown) = applied
        .iter()
        .find(|v| !MIGRATIONS.iter().any(|m| m.version() == v.as_str()))
    {
        return Err(SqliteError::Migration(format!(
            "database has schema version {} unknown to this build",
            unknown
        )));
    }

    for migration in MIGRATIONS {
        if !applied.contains(migration.version()) {
            apply(conn, migration)?;
        }
    }
    Ok(())
}

/// Versions recorded in `schema_migrations`; empty before the first migration.
fn applied_versions(conn: &Connection) -> Result<BTreeSet<String>> {
    let table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if table.is_none() {
        return Ok(BTreeSet::new());
    }

    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;
    Ok(versions)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let started = Instant::now();
    let version = migration.version();

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)
        .map_err(|e| SqliteError::Migration(format!("{}: {}", migration.file, e)))?;
    tx.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, CURRENT_TIMESTAMP)",
        [version],
    )?;
    tx.commit()?;

    tracing::debug!(
        version,
        file = migration.file,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "⊔ applied migration"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
            .unwrap()
            .exists([name])
            .unwrap()
    }

    #[test]
    fn test_versions_come_from_file_names() {
        let versions: Vec<&str> = MIGRATIONS.iter().map(Migration::version).collect();
        assert_eq!(versions, vec!["000", "001"]);

        // Strictly increasing, so application order matches version order
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in ["schema_migrations", "databases", "collections", "records"] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        let applied = applied_versions(&conn).unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
    }

    #[test]
    fn test_unknown_schema_version_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES ('999', CURRENT_TIMESTAMP)",
            [],
        )
        .unwrap();

        let err = migrate(&conn).unwrap_err();
        assert!(matches!(err, SqliteError::Migration(msg) if msg.contains("999")));
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let enabled: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
