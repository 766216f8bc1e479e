//! Artifact classifier: turn every staged group on disk into two upload
//! queues, one for images and one for videos.
//!
//! Both queues are ordered by group ordinal only; inside a group files keep
//! their name order, which is chronological by construction.

use std::path::PathBuf;

use thiserror::Error;

use crate::routing::{AlbumRef, RoutingTable};
use crate::staging::files::{display_date, is_description};
use crate::staging::{list_files, GroupKind, MediaType, StagedGroup, StagingArea, StagingError};

/// A staged group whose content cannot be routed. Reported, never dropped
/// silently; the group stays on disk.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Staged group {group} belongs to '{}', which is not in the routing file", .group.owner())]
    UnknownProfile { group: StagedGroup },

    #[error("Staged group {group} holds {media_type} files but no {kind} {media_type} album is configured for '{}'", .group.owner())]
    MissingDestination {
        group: StagedGroup,
        kind: GroupKind,
        media_type: MediaType,
    },
}

/// One file ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    pub group: StagedGroup,
    pub media_type: MediaType,
    pub album: AlbumRef,
    pub description: Option<String>,
    /// Display name, videos only.
    pub video_name: Option<String>,
}

impl WorkItem {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct UploadQueues {
    pub images: Vec<WorkItem>,
    pub videos: Vec<WorkItem>,
}

impl UploadQueues {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Classification {
    pub queues: UploadQueues,
    pub errors: Vec<ClassifyError>,
}

/// Rewrite mentions so the destination does not turn them into links.
pub fn sanitize_description(text: &str) -> String {
    text.replace('@', "@ ")
}

/// Video display name: `<YYMMDD> Instagram @<owner>` for posts and
/// `<YYMMDD> Instagram stories` for stories.
pub fn video_name(group: &StagedGroup, file_name: &str) -> String {
    let date = display_date(file_name).unwrap_or_else(|| file_name.to_string());
    match group.kind() {
        GroupKind::Post => format!("{} Instagram @{}", date, group.owner()),
        GroupKind::Story => format!("{} Instagram stories", date),
    }
}

/// Build the upload queues from every staged group on disk.
pub async fn classify(
    staging: &StagingArea,
    routing: &RoutingTable,
) -> Result<Classification, StagingError> {
    let mut classification = Classification::default();

    for entry in staging.groups().await? {
        let group = entry.group;
        let files = list_files(&entry.path).await?;

        let mut description = None;
        let mut images = Vec::new();
        let mut videos = Vec::new();
        for path in files {
            if is_description(&path) {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| StagingError::io(&path, e))?;
                let text = text.trim();
                if !text.is_empty() {
                    description = Some(sanitize_description(text));
                }
                continue;
            }
            match MediaType::from_path(&path) {
                Some(MediaType::Image) => images.push(path),
                Some(MediaType::Video) => videos.push(path),
                None => tracing::debug!(group = %group, "Ignoring {}", path.display()),
            }
        }
        if images.is_empty() && videos.is_empty() {
            continue;
        }

        let Some(profile) = routing.get(group.owner()) else {
            classification
                .errors
                .push(ClassifyError::UnknownProfile { group });
            continue;
        };
        let image_album = profile.routes.destination(group.kind(), MediaType::Image);
        let video_album = profile.routes.destination(group.kind(), MediaType::Video);

        let image_album = match (images.is_empty(), image_album) {
            (true, _) => None,
            (false, Some(album)) => Some(album),
            (false, None) => {
                classification.errors.push(ClassifyError::MissingDestination {
                    kind: group.kind(),
                    media_type: MediaType::Image,
                    group,
                });
                continue;
            }
        };

        if let Some(album) = image_album {
            classification
                .queues
                .images
                .extend(images.into_iter().map(|path| WorkItem {
                    path,
                    group: group.clone(),
                    media_type: MediaType::Image,
                    album,
                    description: description.clone(),
                    video_name: None,
                }));
        }

        match video_album {
            Some(album) => {
                classification
                    .queues
                    .videos
                    .extend(videos.into_iter().map(|path| {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        WorkItem {
                            video_name: Some(video_name(&group, &name)),
                            path,
                            group: group.clone(),
                            media_type: MediaType::Video,
                            album,
                            description: description.clone(),
                        }
                    }));
            }
            None if !videos.is_empty() => {
                tracing::debug!(
                    group = %group,
                    "No video album configured, {} video(s) stay staged",
                    videos.len()
                );
            }
            None => {}
        }
    }

    tracing::info!(
        images = classification.queues.images.len(),
        videos = classification.queues.videos.len(),
        errors = classification.errors.len(),
        "Classified staged groups"
    );
    Ok(classification)
}
