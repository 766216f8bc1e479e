//! Ledger trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{LedgerSummary, SyncRunRecord, SyncRunStats, UploadRecord};
use crate::checkpoint::{format_timestamp, parse_timestamp};
use crate::staging::{GroupKind, MediaType};

/// Sync ledger operations, object-safe for `Arc<dyn StateDb>`.
#[async_trait]
pub trait StateDb: Send + Sync {
    /// Start a new sync run and return its id. `checkpoint` is the value
    /// loaded at run start, if the fetch phase runs.
    async fn start_sync_run(&self, checkpoint: Option<DateTime<Utc>>) -> Result<i64, StateError>;

    /// Record that the fetch phase finished and the checkpoint was saved.
    async fn mark_fetch_complete(&self, run_id: i64) -> Result<(), StateError>;

    /// Append one successful upload.
    async fn record_upload(&self, record: &UploadRecord) -> Result<(), StateError>;

    /// Complete a sync run with its counters.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError>;

    async fn get_summary(&self) -> Result<LedgerSummary, StateError>;

    /// Most recent uploads, newest first.
    async fn recent_uploads(&self, limit: usize) -> Result<Vec<UploadRecord>, StateError>;
}

pub struct SqliteStateDb {
    /// rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStateDb {
    /// Open or create the ledger at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }
}

#[async_trait]
impl StateDb for SqliteStateDb {
    async fn start_sync_run(&self, checkpoint: Option<DateTime<Utc>>) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        let checkpoint = checkpoint.as_ref().map(format_timestamp);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_runs (started_at, checkpoint) VALUES (?1, ?2)",
            rusqlite::params![started_at, checkpoint],
        )
        .map_err(StateError::query)?;

        Ok(conn.last_insert_rowid())
    }

    async fn mark_fetch_complete(&self, run_id: i64) -> Result<(), StateError> {
        let now = Utc::now().timestamp();
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_runs SET fetch_completed_at = ?1 WHERE id = ?2",
            rusqlite::params![now, run_id],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn record_upload(&self, record: &UploadRecord) -> Result<(), StateError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO uploads (run_id, owner, ordinal, kind, media_type, file_name, url, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            rusqlite::params![
                record.run_id,
                &record.owner,
                record.ordinal as i64,
                record.kind.as_str(),
                record.media_type.as_str(),
                &record.file_name,
                &record.url,
                record.uploaded_at.timestamp(),
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE sync_runs SET
                completed_at = ?1,
                groups_staged = ?2,
                profiles_failed = ?3,
                images_uploaded = ?4,
                videos_uploaded = ?5,
                uploads_failed = ?6,
                groups_reclaimed = ?7,
                config_errors = ?8,
                interrupted = ?9
            WHERE id = ?10
            "#,
            rusqlite::params![
                completed_at,
                stats.groups_staged as i64,
                stats.profiles_failed as i64,
                stats.images_uploaded as i64,
                stats.videos_uploaded as i64,
                stats.uploads_failed as i64,
                stats.groups_reclaimed as i64,
                stats.config_errors as i64,
                stats.interrupted,
                run_id,
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn get_summary(&self) -> Result<LedgerSummary, StateError> {
        let conn = self.conn()?;

        let count = |sql: &str| -> Result<u64, StateError> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(StateError::query)
        };
        let total_uploads = count("SELECT COUNT(*) FROM uploads")?;
        let images_uploaded = count("SELECT COUNT(*) FROM uploads WHERE media_type = 'image'")?;
        let videos_uploaded = count("SELECT COUNT(*) FROM uploads WHERE media_type = 'video'")?;

        let last_run = conn
            .query_row(
                r#"
                SELECT id, started_at, checkpoint, fetch_completed_at, completed_at,
                       groups_staged, profiles_failed, images_uploaded, videos_uploaded,
                       uploads_failed, groups_reclaimed, config_errors, interrupted
                FROM sync_runs ORDER BY id DESC LIMIT 1
                "#,
                [],
                row_to_sync_run,
            )
            .optional()
            .map_err(StateError::query)?;

        Ok(LedgerSummary {
            total_uploads,
            images_uploaded,
            videos_uploaded,
            last_run,
        })
    }

    async fn recent_uploads(&self, limit: usize) -> Result<Vec<UploadRecord>, StateError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT run_id, owner, ordinal, kind, media_type, file_name, url, uploaded_at FROM uploads ORDER BY id DESC LIMIT ?1",
            )
            .map_err(StateError::query)?;

        let records = stmt
            .query_map([limit as i64], row_to_upload)
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(records.into_iter().flatten().collect())
    }
}

fn timestamp(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

fn row_to_sync_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRunRecord> {
    let started_at: i64 = row.get(1)?;
    let checkpoint: Option<String> = row.get(2)?;
    let counter = |idx: usize| -> rusqlite::Result<u64> {
        Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) as u64)
    };
    Ok(SyncRunRecord {
        id: row.get(0)?,
        started_at: timestamp(Some(started_at)).unwrap_or_default(),
        checkpoint: checkpoint.and_then(|c| parse_timestamp(&c)),
        fetch_completed_at: timestamp(row.get(3)?),
        completed_at: timestamp(row.get(4)?),
        stats: SyncRunStats {
            groups_staged: counter(5)?,
            profiles_failed: counter(6)?,
            images_uploaded: counter(7)?,
            videos_uploaded: counter(8)?,
            uploads_failed: counter(9)?,
            groups_reclaimed: counter(10)?,
            config_errors: counter(11)?,
            interrupted: row.get::<_, Option<bool>>(12)?.unwrap_or(false),
        },
    })
}

/// Rows with an unknown kind or media type are skipped.
fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<Option<UploadRecord>> {
    let kind: String = row.get(3)?;
    let media_type: String = row.get(4)?;
    let Ok(kind) = kind.parse::<GroupKind>() else {
        return Ok(None);
    };
    let media_type = match media_type.as_str() {
        "image" => MediaType::Image,
        "video" => MediaType::Video,
        _ => return Ok(None),
    };
    Ok(Some(UploadRecord {
        run_id: row.get(0)?,
        owner: row.get(1)?,
        ordinal: row.get::<_, i64>(2)? as u64,
        kind,
        media_type,
        file_name: row.get(5)?,
        url: row.get(6)?,
        uploaded_at: timestamp(row.get(7)?).unwrap_or_default(),
    }))
}
