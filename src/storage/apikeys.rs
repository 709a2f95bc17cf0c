//! API key rows.

use rusqlite::{params, Connection};

use crate::access::{AccessScope, Apikey};
use crate::error::StorageError;
use crate::Result;

/// Load every API key row, ordered by the cosmetic order column.
///
/// Rows with an empty secret get a fresh random UUID; an empty ident is
/// defaulted. A malformed `systems` column loads as an empty rule list.
///
/// # Errors
///
/// Returns an `apikeys.read`-prefixed error on database failure.
pub fn read_apikeys(conn: &Connection) -> Result<Vec<Apikey>> {
    let err = |e: rusqlite::Error| StorageError::registry("apikeys.read", e.to_string());

    let mut stmt = conn
        .prepare(
            r#"SELECT _id, disabled, ident, key, "order", systems
               FROM rdioScannerApiKeys
               ORDER BY "order", _id"#,
        )
        .map_err(err)?;

    let rows = stmt
        .query_map([], |row| {
            let id: Option<i64> = row.get(0)?;
            let disabled: bool = row.get(1)?;
            let ident: String = row.get(2)?;
            let key: String = row.get(3)?;
            let order: Option<i64> = row.get(4)?;
            let systems: String = row.get(5)?;
            Ok((id, disabled, ident, key, order, systems))
        })
        .map_err(err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(err)?;

    let keys = rows
        .into_iter()
        .map(|(id, disabled, ident, key, order, systems)| Apikey {
            id: id.filter(|&v| v > 0).and_then(|v| u32::try_from(v).ok()),
            disabled,
            ident: if ident.is_empty() {
                "default".to_string()
            } else {
                ident
            },
            key: if key.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                key
            },
            order: order.filter(|&v| v > 0).and_then(|v| u32::try_from(v).ok()),
            systems: serde_json::from_str(&systems).unwrap_or_default(),
        })
        .collect();

    Ok(keys)
}

/// Diff-persist the key list: delete rows whose ids are gone, then insert
/// new entries and update existing ones by id.
///
/// The `systems` column stores the scope as JSON; the wildcard persists as
/// the string `"*"`, never as an empty array.
///
/// # Errors
///
/// Returns an `apikeys.write`-prefixed error on database failure.
pub fn write_apikeys(conn: &Connection, keys: &[Apikey]) -> Result<()> {
    let err = |e: rusqlite::Error| StorageError::registry("apikeys.write", e.to_string());

    let existing: Vec<u32> = {
        let mut stmt = conn
            .prepare("SELECT _id FROM rdioScannerApiKeys")
            .map_err(err)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(err)?;
        rows
    };

    for id in existing {
        if !keys.iter().any(|k| k.id == Some(id)) {
            conn.execute("DELETE FROM rdioScannerApiKeys WHERE _id = ?", [id])
                .map_err(err)?;
        }
    }

    for apikey in keys {
        let systems = serialize_scope(&apikey.systems)?;
        match apikey.id {
            None => {
                conn.execute(
                    r#"INSERT INTO rdioScannerApiKeys (disabled, ident, key, "order", systems)
                       VALUES (?, ?, ?, ?, ?)"#,
                    params![apikey.disabled, apikey.ident, apikey.key, apikey.order, systems],
                )
                .map_err(err)?;
            }
            Some(id) => {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM rdioScannerApiKeys WHERE _id = ?",
                        [id],
                        |row| row.get(0),
                    )
                    .map_err(err)?;

                if count == 0 {
                    conn.execute(
                        r#"INSERT INTO rdioScannerApiKeys (_id, disabled, ident, key, "order", systems)
                           VALUES (?, ?, ?, ?, ?, ?)"#,
                        params![
                            id,
                            apikey.disabled,
                            apikey.ident,
                            apikey.key,
                            apikey.order,
                            systems
                        ],
                    )
                    .map_err(err)?;
                } else {
                    conn.execute(
                        r#"UPDATE rdioScannerApiKeys
                           SET disabled = ?, ident = ?, key = ?, "order" = ?, systems = ?
                           WHERE _id = ?"#,
                        params![
                            apikey.disabled,
                            apikey.ident,
                            apikey.key,
                            apikey.order,
                            systems,
                            id
                        ],
                    )
                    .map_err(err)?;
                }
            }
        }
    }

    Ok(())
}

fn serialize_scope(scope: &AccessScope) -> Result<String> {
    serde_json::to_string(scope)
        .map_err(|e| StorageError::registry("apikeys.write", e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{SystemRule, TalkgroupScope};
    use crate::storage::{migrate, Database};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(migrate).unwrap();
        db
    }

    #[test]
    fn test_insert_and_read_round_trip() {
        let db = setup_db();

        let mut apikey = Apikey::new("scanner-feed");
        apikey.systems = AccessScope::Systems(vec![SystemRule {
            id: 7,
            talkgroups: TalkgroupScope::List(vec![100, 200]),
        }]);

        db.with_conn(|conn| write_apikeys(conn, &[apikey.clone()]))
            .unwrap();

        let keys = db.with_conn(read_apikeys).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].id.is_some());
        assert_eq!(keys[0].ident, "scanner-feed");
        assert_eq!(keys[0].key, apikey.key);
        assert_eq!(keys[0].systems, apikey.systems);
    }

    #[test]
    fn test_wildcard_scope_persists_as_string() {
        let db = setup_db();

        let mut apikey = Apikey::new("admin");
        apikey.systems = AccessScope::Wildcard;
        db.with_conn(|conn| write_apikeys(conn, &[apikey])).unwrap();

        let stored: String = db
            .with_conn(|conn| {
                conn.query_row("SELECT systems FROM rdioScannerApiKeys", [], |row| {
                    row.get(0)
                })
                .map_err(|e| StorageError::Database(e.to_string()).into())
            })
            .unwrap();
        assert_eq!(stored, "\"*\"");

        let keys = db.with_conn(read_apikeys).unwrap();
        assert_eq!(keys[0].systems, AccessScope::Wildcard);
    }

    #[test]
    fn test_empty_key_gets_random_uuid() {
        let db = setup_db();

        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rdioScannerApiKeys (ident, key, systems) VALUES ('', '', '[]')",
                [],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        let keys = db.with_conn(read_apikeys).unwrap();
        assert!(!keys[0].key.is_empty());
        assert_eq!(keys[0].ident, "default");
    }

    #[test]
    fn test_malformed_systems_loads_as_empty() {
        let db = setup_db();

        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rdioScannerApiKeys (ident, key, systems)
                 VALUES ('feed', 'abc', 'not json')",
                [],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
            Ok(())
        })
        .unwrap();

        let keys = db.with_conn(read_apikeys).unwrap();
        assert_eq!(keys[0].systems, AccessScope::Systems(Vec::new()));
    }

    #[test]
    fn test_write_deletes_removed_rows() {
        let db = setup_db();

        db.with_conn(|conn| write_apikeys(conn, &[Apikey::new("a"), Apikey::new("b")]))
            .unwrap();

        let loaded = db.with_conn(read_apikeys).unwrap();
        assert_eq!(loaded.len(), 2);

        let keep = loaded.into_iter().next().unwrap();
        db.with_conn(|conn| write_apikeys(conn, std::slice::from_ref(&keep)))
            .unwrap();

        let remaining = db.with_conn(read_apikeys).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
    }
}
