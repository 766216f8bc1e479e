//! Ledger schema and `user_version` migrations.

use rusqlite::Connection;

use super::error::StateError;

/// Bump together with a new `SCHEMA_V<n>` step in [`migrate`].
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    checkpoint TEXT,
    fetch_completed_at INTEGER,
    completed_at INTEGER,
    groups_staged INTEGER DEFAULT 0,
    profiles_failed INTEGER DEFAULT 0,
    images_uploaded INTEGER DEFAULT 0,
    videos_uploaded INTEGER DEFAULT 0,
    uploads_failed INTEGER DEFAULT 0,
    groups_reclaimed INTEGER DEFAULT 0,
    config_errors INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES sync_runs(id),
    owner TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    kind TEXT NOT NULL,
    media_type TEXT NOT NULL,
    file_name TEXT NOT NULL,
    url TEXT NOT NULL,
    uploaded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_uploads_run ON uploads(run_id);
CREATE INDEX IF NOT EXISTS idx_uploads_owner ON uploads(owner);
"#;

pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StateError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Create the schema on a fresh database and refuse one written by a newer
/// build. Safe to call on every open.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StateError> {
    match get_schema_version(conn)? {
        found if found > SCHEMA_VERSION => Err(StateError::UnsupportedSchemaVersion {
            found,
            expected: SCHEMA_VERSION,
        }),
        0 => {
            conn.execute_batch(SCHEMA_V1)?;
            set_schema_version(conn, SCHEMA_VERSION)?;
            tracing::debug!("Initialized ledger schema at version {}", SCHEMA_VERSION);
            Ok(())
        }
        // Version 1 is the only layout so far.
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_db_gets_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_twice_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_unsupported_version() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        let result = migrate(&conn);
        assert!(matches!(
            result,
            Err(StateError::UnsupportedSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM uploads", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_runs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_indexes_created() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_uploads_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}
