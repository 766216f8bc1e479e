//! Error types for the staging area.

use std::path::PathBuf;

use thiserror::Error;

/// Local storage failures. Every variant is fatal for the run.
#[derive(Error, Debug)]
pub enum StagingError {
    /// A filesystem operation on a staging path failed.
    #[error("Staging I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A directory carries the group delimiter but does not decode.
    #[error("Invalid staged group name: {0}")]
    InvalidGroupName(String),

    /// An owner username cannot be encoded into a group name.
    #[error("Username '{0}' cannot be used in a staged group name")]
    InvalidOwner(String),

    /// A group directory with the same name already exists.
    #[error("Staged group {0} already exists")]
    GroupExists(PathBuf),

    /// Another process holds the staging lock.
    #[error("Another instavk-sync run is using this staging area (lock: {0})")]
    Locked(PathBuf),

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}

impl StagingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
