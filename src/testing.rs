//! In-process source and destination doubles for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};

use crate::dest::{DestinationClient, UploadError, UploadKind, UploadRef};
use crate::routing::{AlbumRef, ProfileRoutes, RoutingTable, SourceProfile};
use crate::source::{
    FetchError, Post, PostPage, ProfileId, RemoteMedia, RemoteProfile, SourceClient, Story,
    StoryItem,
};
use crate::staging::MediaType;

pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn image(url: &str) -> RemoteMedia {
    RemoteMedia {
        url: url.to_string(),
        media_type: MediaType::Image,
    }
}

pub fn video(url: &str) -> RemoteMedia {
    RemoteMedia {
        url: url.to_string(),
        media_type: MediaType::Video,
    }
}

pub fn post(id: &str, taken_at: DateTime<Utc>, media: Vec<RemoteMedia>) -> Post {
    Post {
        id: id.to_string(),
        taken_at,
        caption: None,
        pinned: false,
        media,
    }
}

pub fn story_item(id: &str, taken_at: DateTime<Utc>, media: RemoteMedia) -> StoryItem {
    StoryItem {
        id: id.to_string(),
        taken_at,
        media,
    }
}

pub fn album(group_id: u64, album_id: u64) -> AlbumRef {
    AlbumRef { group_id, album_id }
}

pub fn routing(profiles: Vec<(&str, ProfileRoutes)>) -> RoutingTable {
    RoutingTable::from_profiles(
        profiles
            .into_iter()
            .map(|(username, routes)| SourceProfile {
                username: username.to_string(),
                routes,
            })
            .collect(),
    )
}

/// Routes where every (kind, media) pair has a destination.
pub fn all_routes() -> ProfileRoutes {
    ProfileRoutes {
        post_images: Some(album(1, 10)),
        post_videos: Some(album(1, 11)),
        story_images: Some(album(1, 12)),
        story_videos: Some(album(1, 13)),
    }
}

/// Source double serving fixed timelines in pages.
pub struct MockSource {
    posts: HashMap<String, Vec<Post>>,
    stories: Vec<Story>,
    failing: HashSet<String>,
    failing_downloads: HashSet<String>,
    page_size: usize,
    downloads: Mutex<Vec<String>>,
    pages_requested: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            posts: HashMap::new(),
            stories: Vec::new(),
            failing: HashSet::new(),
            failing_downloads: HashSet::new(),
            page_size: 2,
            downloads: Mutex::new(Vec::new()),
            pages_requested: AtomicUsize::new(0),
        }
    }

    /// `posts` newest first, as the platform lists them.
    pub fn with_posts(mut self, username: &str, posts: Vec<Post>) -> Self {
        self.posts.insert(username.to_string(), posts);
        self
    }

    pub fn with_story(mut self, owner: &str, items: Vec<StoryItem>) -> Self {
        self.stories.push(Story {
            owner: owner.to_string(),
            items,
        });
        self
    }

    /// Every call for `username` fails.
    pub fn failing(mut self, username: &str) -> Self {
        self.failing.insert(username.to_string());
        self
    }

    /// Downloads of `url` fail; everything else still works.
    pub fn failing_download(mut self, url: &str) -> Self {
        self.failing_downloads.insert(url.to_string());
        self
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn pages_requested(&self) -> usize {
        self.pages_requested.load(Ordering::SeqCst)
    }

    fn unavailable(username: &str) -> FetchError {
        FetchError::HttpStatus {
            status: 403,
            url: format!("mock://{username}"),
        }
    }
}

#[async_trait::async_trait]
impl SourceClient for MockSource {
    async fn profile(&self, username: &str) -> Result<RemoteProfile, FetchError> {
        if self.failing.contains(username) {
            return Err(Self::unavailable(username));
        }
        Ok(RemoteProfile {
            id: ProfileId(format!("id-{username}")),
            username: username.to_string(),
        })
    }

    async fn posts_page(
        &self,
        profile: &RemoteProfile,
        cursor: Option<&str>,
    ) -> Result<PostPage, FetchError> {
        self.pages_requested.fetch_add(1, Ordering::SeqCst);
        let posts = self
            .posts
            .get(&profile.username)
            .cloned()
            .unwrap_or_default();
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(posts.len());
        Ok(PostPage {
            posts: posts[start.min(end)..end].to_vec(),
            next_cursor: (end < posts.len()).then(|| end.to_string()),
        })
    }

    async fn story_items(&self, profiles: &[ProfileId]) -> Result<Vec<Story>, FetchError> {
        Ok(self
            .stories
            .iter()
            .filter(|s| profiles.contains(&ProfileId(format!("id-{}", s.owner))))
            .cloned()
            .collect())
    }

    async fn download(&self, media: &RemoteMedia, dest: &Path) -> Result<(), FetchError> {
        if self.failing_downloads.contains(&media.url) {
            return Err(Self::unavailable(&media.url));
        }
        tokio::fs::write(dest, media.url.as_bytes()).await?;
        self.downloads.lock().unwrap().push(media.url.clone());
        Ok(())
    }
}

/// One upload seen by [`MockDestination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockUpload {
    pub file_name: String,
    pub kind: UploadKind,
    pub album: AlbumRef,
    pub text: Option<String>,
    pub name: Option<String>,
}

/// Destination double recording uploads. Can be told to fail permanently
/// after a number of successful uploads of one kind.
pub struct MockDestination {
    uploads: Mutex<Vec<MockUpload>>,
    photo_budget: Option<usize>,
    video_budget: Option<usize>,
    next_id: AtomicI64,
}

impl MockDestination {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            photo_budget: None,
            video_budget: None,
            next_id: AtomicI64::new(1),
        }
    }

    pub fn failing_photos_after(mut self, n: usize) -> Self {
        self.photo_budget = Some(n);
        self
    }

    pub fn failing_videos_after(mut self, n: usize) -> Self {
        self.video_budget = Some(n);
        self
    }

    pub fn uploads(&self) -> Vec<MockUpload> {
        self.uploads.lock().unwrap().clone()
    }

    fn record(&self, upload: MockUpload) -> Result<UploadRef, UploadError> {
        let mut uploads = self.uploads.lock().unwrap();
        let budget = match upload.kind {
            UploadKind::Photo => self.photo_budget,
            UploadKind::Video => self.video_budget,
        };
        let done = uploads.iter().filter(|u| u.kind == upload.kind).count();
        if budget.is_some_and(|b| done >= b) {
            return Err(UploadError::Api {
                method: "mock.upload".to_string(),
                code: 100,
                message: "rejected".to_string(),
            });
        }
        let kind = upload.kind;
        uploads.push(upload);
        Ok(UploadRef {
            kind,
            owner_id: -1,
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }
}

fn file_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl DestinationClient for MockDestination {
    async fn upload_photo(
        &self,
        file: &Path,
        caption: Option<&str>,
        album: AlbumRef,
    ) -> Result<UploadRef, UploadError> {
        tokio::fs::metadata(file)
            .await
            .map_err(|source| UploadError::Disk {
                path: file.to_path_buf(),
                source,
            })?;
        self.record(MockUpload {
            file_name: file_name(file),
            kind: UploadKind::Photo,
            album,
            text: caption.map(str::to_string),
            name: None,
        })
    }

    async fn upload_video(
        &self,
        file: &Path,
        name: &str,
        description: Option<&str>,
        album: AlbumRef,
    ) -> Result<UploadRef, UploadError> {
        tokio::fs::metadata(file)
            .await
            .map_err(|source| UploadError::Disk {
                path: file.to_path_buf(),
                source,
            })?;
        self.record(MockUpload {
            file_name: file_name(file),
            kind: UploadKind::Video,
            album,
            text: description.map(str::to_string),
            name: Some(name.to_string()),
        })
    }
}
