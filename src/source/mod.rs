//! Source platform boundary.
//!
//! The fetch planner only talks to [`SourceClient`]; the Instagram
//! implementation lives in [`instagram`].

pub mod error;
pub mod instagram;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::staging::MediaType;

pub use error::FetchError;
pub use instagram::InstagramClient;

/// Platform-internal profile id, needed to list stories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProfile {
    pub id: ProfileId,
    pub username: String,
}

/// One downloadable media resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    pub url: String,
    pub media_type: MediaType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub taken_at: DateTime<Utc>,
    pub caption: Option<String>,
    /// Pinned posts are listed first regardless of their age.
    pub pinned: bool,
    pub media: Vec<RemoteMedia>,
}

/// One page of a profile timeline, newest first.
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryItem {
    pub id: String,
    pub taken_at: DateTime<Utc>,
    pub media: RemoteMedia,
}

/// Currently available story items of one profile.
#[derive(Debug, Clone)]
pub struct Story {
    pub owner: String,
    pub items: Vec<StoryItem>,
}

#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    /// Resolve a username to its profile.
    async fn profile(&self, username: &str) -> Result<RemoteProfile, FetchError>;

    /// One page of the profile's posts, newest first. `cursor` is the
    /// `next_cursor` of the previous page.
    async fn posts_page(
        &self,
        profile: &RemoteProfile,
        cursor: Option<&str>,
    ) -> Result<PostPage, FetchError>;

    /// Story items of the given profiles.
    async fn story_items(&self, profiles: &[ProfileId]) -> Result<Vec<Story>, FetchError>;

    /// Download one media resource to `dest`. `dest` must only appear once
    /// the transfer is complete.
    async fn download(&self, media: &RemoteMedia, dest: &Path) -> Result<(), FetchError>;
}
