//! Database schema definitions and migrations.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let current_version = get_current_version(conn)?;
    tracing::debug!(
        current = current_version,
        target = SCHEMA_VERSION,
        "Checking database migrations"
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(StorageError::Migration(format!("failed to get version: {e}")).into()),
    }
}

fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let now = i64::try_from(now).unwrap_or_default();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![version, now],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;

    Ok(())
}

/// Migration v1: the watch and API key tables.
///
/// `order` is a reserved word and stays double-quoted at every query site.
fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v1: initial schema");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS rdioScannerApiKeys (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            disabled INTEGER NOT NULL DEFAULT 0,
            ident TEXT NOT NULL DEFAULT '',
            key TEXT NOT NULL DEFAULT '',
            "order" INTEGER,
            systems TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS rdioScannerDirWatches (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            delay INTEGER,
            deleteAfter INTEGER NOT NULL DEFAULT 0,
            directory TEXT NOT NULL,
            disabled INTEGER NOT NULL DEFAULT 0,
            extension TEXT,
            frequency INTEGER,
            mask TEXT,
            "order" INTEGER,
            systemId INTEGER,
            talkgroupId INTEGER,
            type TEXT NOT NULL DEFAULT 'default',
            usePolling INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .map_err(|e| StorageError::Migration(format!("v1 failed: {e}")))?;

    record_migration(conn, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_migrate_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(migrate).unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master
                     WHERE type = 'table' AND name IN ('rdioScannerApiKeys', 'rdioScannerDirWatches')",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| StorageError::Database(e.to_string()).into())
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(migrate).unwrap();
        db.with_conn(migrate).unwrap();

        let version: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT MAX(version) FROM schema_migrations",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| StorageError::Database(e.to_string()).into())
            })
            .unwrap();
        assert_eq!(version, i64::from(SCHEMA_VERSION));
    }
}
