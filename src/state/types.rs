//! Records stored in the sync ledger.

use chrono::{DateTime, Utc};

use crate::staging::{GroupKind, MediaType};

/// Counters for a single sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    pub groups_staged: u64,
    pub profiles_failed: u64,
    pub images_uploaded: u64,
    pub videos_uploaded: u64,
    pub uploads_failed: u64,
    pub groups_reclaimed: u64,
    pub config_errors: u64,
    /// The run was stopped by a shutdown signal.
    pub interrupted: bool,
}

/// One row of `sync_runs`.
#[derive(Debug, Clone)]
pub struct SyncRunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    /// Checkpoint loaded at the start of the run.
    pub checkpoint: Option<DateTime<Utc>>,
    pub fetch_completed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: SyncRunStats,
}

/// One successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub run_id: i64,
    pub owner: String,
    pub ordinal: u64,
    pub kind: GroupKind,
    pub media_type: MediaType,
    pub file_name: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Summary shown by `status`.
#[derive(Debug, Clone)]
pub struct LedgerSummary {
    pub total_uploads: u64,
    pub images_uploaded: u64,
    pub videos_uploaded: u64,
    pub last_run: Option<SyncRunRecord>,
}
