//! Destination platform boundary.

pub mod error;
pub mod vk;

use std::fmt;
use std::path::Path;

use crate::routing::AlbumRef;

pub use error::UploadError;
pub use vk::VkClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Photo,
    Video,
}

/// Durable reference to an uploaded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRef {
    pub kind: UploadKind,
    pub owner_id: i64,
    pub id: i64,
}

impl UploadRef {
    pub fn url(&self) -> String {
        let prefix = match self.kind {
            UploadKind::Photo => "photo",
            UploadKind::Video => "video",
        };
        format!("https://vk.com/{}{}_{}", prefix, self.owner_id, self.id)
    }
}

impl fmt::Display for UploadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

#[async_trait::async_trait]
pub trait DestinationClient: Send + Sync {
    async fn upload_photo(
        &self,
        file: &Path,
        caption: Option<&str>,
        album: AlbumRef,
    ) -> Result<UploadRef, UploadError>;

    async fn upload_video(
        &self,
        file: &Path,
        name: &str,
        description: Option<&str>,
        album: AlbumRef,
    ) -> Result<UploadRef, UploadError>;
}
