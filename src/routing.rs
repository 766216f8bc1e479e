//! Routing table: which destination album receives which content of which
//! source profile.
//!
//! Loaded once from a `;`-delimited CSV file with one row per Instagram
//! profile. Every VK link is parsed into a typed [`AlbumRef`] at load time,
//! so a malformed row aborts the run before anything is fetched or deleted.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::staging::{GroupKind, MediaType};

const PROFILE_COLUMN: &str = "Instagram Link";
const POST_PHOTO_COLUMN: &str = "VK album link post photo";
const POST_VIDEO_COLUMN: &str = "VK album link post video";
const STORY_PHOTO_COLUMN: &str = "VK album link stories photo";
const STORY_VIDEO_COLUMN: &str = "VK album link stories video";

const DELIMITER: u8 = b';';

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("Routing file {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Routing file is not valid CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row}: '{link}' is not an Instagram profile link")]
    InvalidProfileLink { row: usize, link: String },

    #[error("Row {row}, column '{column}': '{link}' is not a VK {expected} link")]
    InvalidAlbumLink {
        row: usize,
        column: &'static str,
        link: String,
        expected: &'static str,
    },

    #[error("Profile '{0}' is listed more than once")]
    DuplicateProfile(String),

    #[error("Routing file {0} did not exist; a template was written there. Add your links and run again")]
    TemplateWritten(PathBuf),
}

/// A destination container on VK: an album inside a community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlbumRef {
    pub group_id: u64,
    pub album_id: u64,
}

impl fmt::Display for AlbumRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-{}_{}", self.group_id, self.album_id)
    }
}

/// Destinations of one profile, one slot per (kind, media type).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileRoutes {
    pub post_images: Option<AlbumRef>,
    pub post_videos: Option<AlbumRef>,
    pub story_images: Option<AlbumRef>,
    pub story_videos: Option<AlbumRef>,
}

impl ProfileRoutes {
    pub fn destination(&self, kind: GroupKind, media: MediaType) -> Option<AlbumRef> {
        match (kind, media) {
            (GroupKind::Post, MediaType::Image) => self.post_images,
            (GroupKind::Post, MediaType::Video) => self.post_videos,
            (GroupKind::Story, MediaType::Image) => self.story_images,
            (GroupKind::Story, MediaType::Video) => self.story_videos,
        }
    }

    /// Whether any media of `kind` has somewhere to go.
    pub fn accepts(&self, kind: GroupKind) -> bool {
        self.destination(kind, MediaType::Image).is_some()
            || self.destination(kind, MediaType::Video).is_some()
    }
}

/// A configured source profile with its routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceProfile {
    pub username: String,
    pub routes: ProfileRoutes,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    #[serde(rename = "Instagram Link")]
    profile: String,
    #[serde(rename = "VK album link post photo", default)]
    post_photo: Option<String>,
    #[serde(rename = "VK album link post video", default)]
    post_video: Option<String>,
    #[serde(rename = "VK album link stories photo", default)]
    story_photo: Option<String>,
    #[serde(rename = "VK album link stories video", default)]
    story_video: Option<String>,
}

/// All configured profiles, in file order.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    profiles: Vec<SourceProfile>,
    index: HashMap<String, usize>,
}

impl RoutingTable {
    /// Load the routing file. A missing file gets a template written in its
    /// place and is reported as [`RoutingError::TemplateWritten`].
    pub fn load(path: &Path) -> Result<Self, RoutingError> {
        match std::fs::File::open(path) {
            Ok(file) => Self::from_reader(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_template(path)?;
                Err(RoutingError::TemplateWritten(path.to_path_buf()))
            }
            Err(e) => Err(RoutingError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RoutingError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = Self::default();
        for (i, row) in csv_reader.deserialize::<RouteRow>().enumerate() {
            // Row 1 is the header.
            let row_number = i + 2;
            let row = row?;
            let username = parse_profile_link(&row.profile).ok_or_else(|| {
                RoutingError::InvalidProfileLink {
                    row: row_number,
                    link: row.profile.clone(),
                }
            })?;
            let routes = ProfileRoutes {
                post_images: parse_cell(row_number, POST_PHOTO_COLUMN, row.post_photo, parse_photo_album)?,
                post_videos: parse_cell(row_number, POST_VIDEO_COLUMN, row.post_video, parse_video_album)?,
                story_images: parse_cell(row_number, STORY_PHOTO_COLUMN, row.story_photo, parse_photo_album)?,
                story_videos: parse_cell(row_number, STORY_VIDEO_COLUMN, row.story_video, parse_video_album)?,
            };
            table.insert(SourceProfile { username, routes })?;
        }
        Ok(table)
    }

    fn insert(&mut self, profile: SourceProfile) -> Result<(), RoutingError> {
        if self.index.contains_key(&profile.username) {
            return Err(RoutingError::DuplicateProfile(profile.username));
        }
        self.index
            .insert(profile.username.clone(), self.profiles.len());
        self.profiles.push(profile);
        Ok(())
    }

    pub fn profiles(&self) -> &[SourceProfile] {
        &self.profiles
    }

    pub fn get(&self, username: &str) -> Option<&SourceProfile> {
        self.index.get(username).map(|&i| &self.profiles[i])
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Every link this table was built from, in file order.
    pub fn links(&self) -> Vec<String> {
        let mut links = Vec::new();
        for profile in &self.profiles {
            links.push(profile_link(&profile.username));
            let routes = &profile.routes;
            links.extend(routes.post_images.map(photo_album_link));
            links.extend(routes.post_videos.map(video_album_link));
            links.extend(routes.story_images.map(photo_album_link));
            links.extend(routes.story_videos.map(video_album_link));
        }
        links
    }

    #[cfg(test)]
    pub(crate) fn from_profiles(profiles: Vec<SourceProfile>) -> Self {
        let mut table = Self::default();
        for profile in profiles {
            table.insert(profile).unwrap();
        }
        table
    }
}

fn parse_cell(
    row: usize,
    column: &'static str,
    cell: Option<String>,
    parse: fn(&str) -> Option<AlbumRef>,
) -> Result<Option<AlbumRef>, RoutingError> {
    let Some(link) = cell.filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let expected = if column == POST_VIDEO_COLUMN || column == STORY_VIDEO_COLUMN {
        "video album"
    } else {
        "photo album"
    };
    parse(&link)
        .map(Some)
        .ok_or(RoutingError::InvalidAlbumLink {
            row,
            column,
            link,
            expected,
        })
}

/// Instagram usernames: ASCII letters, digits, `.` and `_`, at most 30.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 30
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
}

/// `https://www.instagram.com/<username>/` (or a bare username).
fn parse_profile_link(link: &str) -> Option<String> {
    if !link.contains("://") {
        return is_valid_username(link).then(|| link.to_string());
    }
    let url = Url::parse(link).ok()?;
    let host = url.host_str()?;
    if host != "instagram.com" && !host.ends_with(".instagram.com") {
        return None;
    }
    let username = url.path_segments()?.find(|s| !s.is_empty())?;
    is_valid_username(username).then(|| username.to_string())
}

fn is_vk_host(url: &Url) -> bool {
    matches!(url.host_str(), Some("vk.com" | "www.vk.com" | "m.vk.com"))
}

/// Split `<group>_<album>` into an [`AlbumRef`].
fn split_owner_album(s: &str) -> Option<AlbumRef> {
    let (group, album) = s.split_once('_')?;
    Some(AlbumRef {
        group_id: group.parse().ok()?,
        album_id: album.parse().ok()?,
    })
}

/// `https://vk.com/album-<group>_<album>`
fn parse_photo_album(link: &str) -> Option<AlbumRef> {
    let url = Url::parse(link).ok()?;
    if !is_vk_host(&url) {
        return None;
    }
    let segment = url.path_segments()?.find(|s| !s.is_empty())?;
    split_owner_album(segment.strip_prefix("album-")?)
}

/// `https://vk.com/videos-<group>?section=album_<album>`
fn parse_video_album(link: &str) -> Option<AlbumRef> {
    let url = Url::parse(link).ok()?;
    if !is_vk_host(&url) {
        return None;
    }
    let segment = url.path_segments()?.find(|s| !s.is_empty())?;
    let group_id: u64 = segment.strip_prefix("videos-")?.parse().ok()?;
    let section = url
        .query_pairs()
        .find(|(k, _)| k == "section")
        .map(|(_, v)| v.into_owned())?;
    let album_id: u64 = section.strip_prefix("album_")?.parse().ok()?;
    Some(AlbumRef { group_id, album_id })
}

pub fn profile_link(username: &str) -> String {
    format!("https://www.instagram.com/{}/", username)
}

fn photo_album_link(album: AlbumRef) -> String {
    format!("https://vk.com/album-{}_{}", album.group_id, album.album_id)
}

fn video_album_link(album: AlbumRef) -> String {
    format!(
        "https://vk.com/videos-{}?section=album_{}",
        album.group_id, album.album_id
    )
}

/// Write a routing file with the expected header and two placeholder rows.
pub fn write_template(path: &Path) -> Result<(), RoutingError> {
    let io_err = |source| RoutingError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .from_path(path)?;
    writer.write_record([
        PROFILE_COLUMN,
        POST_PHOTO_COLUMN,
        POST_VIDEO_COLUMN,
        STORY_PHOTO_COLUMN,
        STORY_VIDEO_COLUMN,
    ])?;
    for n in 1..=2 {
        writer.write_record([
            format!("https://www.instagram.com/PLACE_NAME_{}/", n),
            format!("https://vk.com/album-PLACE_LINK_{}", n),
            format!("https://vk.com/videos-PLACE_LINK_{n}?section=album_PLACE_LINK_{n}"),
            format!("https://vk.com/album-PLACE_LINK_{}", n),
            String::new(),
        ])?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}
