//! Checkpoint store: the instant of the last completed fetch phase.
//!
//! Stored as a single RFC 3339 timestamp in a text file. The file is only
//! rewritten after a fetch phase has fully completed, so a crash mid-run makes
//! the next run re-scan the same window instead of skipping items.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Checkpoint file {path} holds an unreadable timestamp: {value:?}")]
    Parse { path: PathBuf, value: String },
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted checkpoint without creating it.
    pub async fn peek(&self) -> Result<Option<DateTime<Utc>>, CheckpointError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => parse_timestamp(&raw).map(Some).ok_or_else(|| CheckpointError::Parse {
                path: self.path.clone(),
                value: raw.trim().to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Return the persisted checkpoint. When none exists yet, persist `now`
    /// and return it, so a first run only picks up items published after it.
    pub async fn load_or_init(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, CheckpointError> {
        if let Some(checkpoint) = self.peek().await? {
            return Ok(checkpoint);
        }
        tracing::info!(
            "No checkpoint at {}, starting from {}",
            self.path.display(),
            format_timestamp(&now)
        );
        self.save(now).await?;
        Ok(now)
    }

    /// Overwrite the checkpoint via a temporary file and an atomic rename.
    pub async fn save(&self, checkpoint: DateTime<Utc>) -> Result<(), CheckpointError> {
        let io_err = |path: &Path, source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, format_timestamp(&checkpoint))
            .await
            .map_err(|e| io_err(tmp.as_path(), e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_err(self.path.as_path(), e))?;
        tracing::debug!("Checkpoint saved: {}", format_timestamp(&checkpoint));
        Ok(())
    }
}

pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339, or a naive ISO-8601 datetime taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
