//! Watch configuration rows.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::{params, Connection};

use crate::dialect::DialectKind;
use crate::error::StorageError;
use crate::watch::Dirwatch;
use crate::Result;

/// Load every watch row, ordered by the cosmetic order column.
///
/// # Errors
///
/// Returns a `dirwatches.read`-prefixed error on database failure.
pub fn read_dirwatches(conn: &Connection) -> Result<Vec<Dirwatch>> {
    let err = |e: rusqlite::Error| StorageError::registry("dirwatches.read", e.to_string());

    let mut stmt = conn
        .prepare(
            r#"SELECT _id, delay, deleteAfter, directory, disabled, extension, frequency,
                      mask, "order", systemId, talkgroupId, type, usePolling
               FROM rdioScannerDirWatches
               ORDER BY "order", _id"#,
        )
        .map_err(err)?;

    let rows = stmt
        .query_map([], |row| {
            let mut watch = Dirwatch::new(PathBuf::from(row.get::<_, String>(3)?));
            watch.id = opt_u32(row.get(0)?);
            watch.delay = opt_u32(row.get(1)?);
            watch.delete_after = row.get(2)?;
            watch.disabled = row.get(4)?;
            watch.extension = opt_text(row.get(5)?);
            watch.frequency = opt_u64(row.get(6)?);
            watch.mask = opt_text(row.get(7)?);
            watch.order = opt_u32(row.get(8)?);
            watch.system_id = opt_u32(row.get(9)?);
            watch.talkgroup_id = opt_u32(row.get(10)?);
            watch.kind = DialectKind::parse(&row.get::<_, String>(11)?);
            watch.use_polling = row.get(12)?;
            Ok(watch)
        })
        .map_err(err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(err)?;

    Ok(rows)
}

/// Diff-persist the watch list: delete rows whose ids are gone, then insert
/// new entries and update existing ones by id.
///
/// # Errors
///
/// Returns a `dirwatches.write`-prefixed error on database failure.
pub fn write_dirwatches(conn: &Connection, watches: &[Arc<Dirwatch>]) -> Result<()> {
    let err = |e: rusqlite::Error| StorageError::registry("dirwatches.write", e.to_string());

    let existing: Vec<u32> = {
        let mut stmt = conn
            .prepare("SELECT _id FROM rdioScannerDirWatches")
            .map_err(err)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(err)?;
        rows
    };

    for id in existing {
        if !watches.iter().any(|w| w.id == Some(id)) {
            conn.execute("DELETE FROM rdioScannerDirWatches WHERE _id = ?", [id])
                .map_err(err)?;
        }
    }

    for watch in watches {
        let directory = watch.directory.to_string_lossy().into_owned();
        match watch.id {
            None => {
                conn.execute(
                    r#"INSERT INTO rdioScannerDirWatches
                       (delay, deleteAfter, directory, disabled, extension, frequency,
                        mask, "order", systemId, talkgroupId, type, usePolling)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                    params![
                        watch.delay,
                        watch.delete_after,
                        directory,
                        watch.disabled,
                        watch.extension,
                        watch.frequency,
                        watch.mask,
                        watch.order,
                        watch.system_id,
                        watch.talkgroup_id,
                        watch.kind.as_str(),
                        watch.use_polling,
                    ],
                )
                .map_err(err)?;
            }
            Some(id) => {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM rdioScannerDirWatches WHERE _id = ?",
                        [id],
                        |row| row.get(0),
                    )
                    .map_err(err)?;

                if count == 0 {
                    conn.execute(
                        r#"INSERT INTO rdioScannerDirWatches
                           (_id, delay, deleteAfter, directory, disabled, extension, frequency,
                            mask, "order", systemId, talkgroupId, type, usePolling)
                           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
                        params![
                            id,
                            watch.delay,
                            watch.delete_after,
                            directory,
                            watch.disabled,
                            watch.extension,
                            watch.frequency,
                            watch.mask,
                            watch.order,
                            watch.system_id,
                            watch.talkgroup_id,
                            watch.kind.as_str(),
                            watch.use_polling,
                        ],
                    )
                    .map_err(err)?;
                } else {
                    conn.execute(
                        r#"UPDATE rdioScannerDirWatches
                           SET delay = ?, deleteAfter = ?, directory = ?, disabled = ?,
                               extension = ?, frequency = ?, mask = ?, "order" = ?,
                               systemId = ?, talkgroupId = ?, type = ?, usePolling = ?
                           WHERE _id = ?"#,
                        params![
                            watch.delay,
                            watch.delete_after,
                            directory,
                            watch.disabled,
                            watch.extension,
                            watch.frequency,
                            watch.mask,
                            watch.order,
                            watch.system_id,
                            watch.talkgroup_id,
                            watch.kind.as_str(),
                            watch.use_polling,
                            id,
                        ],
                    )
                    .map_err(err)?;
                }
            }
        }
    }

    Ok(())
}

fn opt_u32(v: Option<i64>) -> Option<u32> {
    v.filter(|&v| v > 0).and_then(|v| u32::try_from(v).ok())
}

fn opt_u64(v: Option<i64>) -> Option<u64> {
    v.filter(|&v| v > 0).and_then(|v| u64::try_from(v).ok())
}

fn opt_text(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}
