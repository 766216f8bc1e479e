//! Local staging area: one directory per fetched unit, named by a
//! [`StagedGroup`] descriptor.
//!
//! The staging area is the hand-off point between the fetch phase and the
//! upload phase. Groups stay on disk until everything uploadable in them has
//! been uploaded and deleted, so an interrupted run leaves its work behind for
//! the next one.

pub mod error;
pub mod files;
pub mod group;
pub mod namer;

use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tokio::fs;

pub use error::StagingError;
pub use files::MediaType;
pub use group::{GroupKind, StagedGroup};
pub use namer::StagingNamer;

const LOCK_FILE_NAME: &str = ".lock";

/// A staged group found on disk.
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub group: StagedGroup,
    pub path: PathBuf,
}

/// Exclusive single-writer guard; released when dropped.
#[derive(Debug)]
pub struct StagingLock {
    _file: std::fs::File,
}

/// Root directory holding all staged groups.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the staging root if it does not exist yet.
    pub async fn ensure_exists(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StagingError::io(&self.root, e))
    }

    /// Take the exclusive staging lock for the duration of a run.
    pub async fn lock(&self) -> Result<StagingLock, StagingError> {
        self.ensure_exists().await?;
        let lock_path = self.root.join(LOCK_FILE_NAME);
        let file = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::create(&lock_path)
                .map_err(|e| StagingError::io(&lock_path, e))?;
            file.try_lock_exclusive()
                .map_err(|_| StagingError::Locked(lock_path.clone()))?;
            Ok::<_, StagingError>(file)
        })
        .await??;
        Ok(StagingLock { _file: file })
    }

    /// All staged groups on disk, sorted by ordinal.
    ///
    /// Directories without the group delimiter are not ours and are ignored.
    /// A directory that carries the delimiter but does not decode is logged
    /// and skipped.
    pub async fn groups(&self) -> Result<Vec<GroupEntry>, StagingError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StagingError::io(&self.root, e)),
        };

        let mut groups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StagingError::io(&self.root, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !StagedGroup::is_group_name(name) {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StagingError::io(entry.path(), e))?;
            if !file_type.is_dir() {
                continue;
            }
            match StagedGroup::parse(name) {
                Ok(group) => groups.push(GroupEntry {
                    group,
                    path: entry.path(),
                }),
                Err(e) => tracing::warn!("Skipping staging directory: {}", e),
            }
        }

        groups.sort_by_key(|g| g.group.ordinal());
        Ok(groups)
    }

    /// Create the directory for a new group. Fails if it already exists.
    pub async fn create_group(&self, group: &StagedGroup) -> Result<PathBuf, StagingError> {
        self.ensure_exists().await?;
        let path = self.root.join(group.dir_name());
        match fs::create_dir(&path).await {
            Ok(()) => Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StagingError::GroupExists(path))
            }
            Err(e) => Err(StagingError::io(&path, e)),
        }
    }

    /// Delete every group that holds no image or video file and return the
    /// groups that were removed.
    pub async fn reclaim_empty_groups(&self) -> Result<Vec<StagedGroup>, StagingError> {
        let mut reclaimed = Vec::new();
        for entry in self.groups().await? {
            if count_media_files(&entry.path).await? > 0 {
                continue;
            }
            fs::remove_dir_all(&entry.path)
                .await
                .map_err(|e| StagingError::io(&entry.path, e))?;
            tracing::debug!(group = %entry.group, "Reclaimed empty staged group");
            reclaimed.push(entry.group);
        }
        Ok(reclaimed)
    }
}

/// List the regular files of a group directory, sorted by file name.
pub async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, StagingError> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| StagingError::io(dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StagingError::io(dir, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| StagingError::io(entry.path(), e))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Number of image/video files in a group directory.
pub async fn count_media_files(dir: &Path) -> Result<usize, StagingError> {
    Ok(list_files(dir)
        .await?
        .iter()
        .filter(|p| MediaType::from_path(p).is_some())
        .count())
}
