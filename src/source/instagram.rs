//! Instagram implementation of [`SourceClient`] over the private web API,
//! authenticated with an existing `sessionid` cookie.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::{
    FetchError, Post, PostPage, ProfileId, RemoteMedia, RemoteProfile, SourceClient, Story,
    StoryItem,
};
use crate::staging::MediaType;

const API_BASE: &str = "https://i.instagram.com/api/v1";

/// Public web app id; the API rejects requests without it.
const WEB_APP_ID: &str = "936619743392459";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

const FEED_PAGE_SIZE: u32 = 12;

/// `media_type` values used by the feed API.
const MEDIA_TYPE_VIDEO: u64 = 2;

pub struct InstagramClient {
    client: Client,
    api_base: String,
}

impl std::fmt::Debug for InstagramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstagramClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl InstagramClient {
    pub fn new(session_id: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert("x-ig-app-id", HeaderValue::from_static(WEB_APP_ID));
        let mut cookie = HeaderValue::from_str(&format!("sessionid={}", session_id))?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: API_BASE.to_string(),
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                source: e,
                url: url.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        response.json().await.map_err(|e| FetchError::Http {
            source: e,
            url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl SourceClient for InstagramClient {
    async fn profile(&self, username: &str) -> Result<RemoteProfile, FetchError> {
        let url = format!(
            "{}/users/web_profile_info/?username={}",
            self.api_base, username
        );
        match self.get_json(&url).await {
            Ok(json) => parse_profile(username, &json).ok_or_else(|| FetchError::Malformed {
                url,
                reason: "missing data.user.id".to_string(),
            }),
            Err(FetchError::HttpStatus { status: 404, .. }) => {
                Err(FetchError::ProfileNotFound(username.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn posts_page(
        &self,
        profile: &RemoteProfile,
        cursor: Option<&str>,
    ) -> Result<PostPage, FetchError> {
        let mut url = format!(
            "{}/feed/user/{}/?count={}",
            self.api_base, profile.id.0, FEED_PAGE_SIZE
        );
        if let Some(cursor) = cursor {
            url.push_str("&max_id=");
            url.push_str(cursor);
        }
        let json = self.get_json(&url).await?;
        if !json["items"].is_array() {
            return Err(FetchError::Malformed {
                url,
                reason: "missing items".to_string(),
            });
        }
        Ok(parse_feed_page(&json))
    }

    async fn story_items(&self, profiles: &[ProfileId]) -> Result<Vec<Story>, FetchError> {
        if profiles.is_empty() {
            return Ok(Vec::new());
        }
        let query: Vec<String> = profiles
            .iter()
            .map(|id| format!("reel_ids={}", id.0))
            .collect();
        let url = format!("{}/feed/reels_media/?{}", self.api_base, query.join("&"));
        let json = self.get_json(&url).await?;
        Ok(parse_reels(&json))
    }

    async fn download(&self, media: &RemoteMedia, dest: &Path) -> Result<(), FetchError> {
        let part_path = part_path(dest);
        let result = attempt_download(&self.client, &media.url, dest, &part_path).await;
        if result.is_err() {
            let _ = fs::remove_file(&part_path).await;
        }
        result
    }
}

/// `<name>.part` next to the final destination.
fn part_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Stream the body into the `.part` file, then rename it into place.
async fn attempt_download(
    client: &Client,
    url: &str,
    dest: &Path,
    part_path: &Path,
) -> Result<(), FetchError> {
    let response = client.get(url).send().await.map_err(|e| FetchError::Http {
        source: e,
        url: url.to_string(),
    })?;
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await?;

    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Http {
            source: e,
            url: url.to_string(),
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    fs::rename(part_path, dest).await?;
    tracing::debug!(bytes = bytes_written, "Downloaded {}", dest.display());
    Ok(())
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(v.as_i64()?, 0).single()
}

fn parse_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_profile(username: &str, json: &Value) -> Option<RemoteProfile> {
    let id = parse_id(&json["data"]["user"]["id"])?;
    Some(RemoteProfile {
        id: ProfileId(id),
        username: username.to_string(),
    })
}

/// Best-quality resource of a single feed/story item.
fn parse_media(item: &Value) -> Option<RemoteMedia> {
    if item["media_type"].as_u64() == Some(MEDIA_TYPE_VIDEO) {
        let url = item["video_versions"][0]["url"].as_str()?;
        return Some(RemoteMedia {
            url: url.to_string(),
            media_type: MediaType::Video,
        });
    }
    let url = item["image_versions2"]["candidates"][0]["url"].as_str()?;
    Some(RemoteMedia {
        url: url.to_string(),
        media_type: MediaType::Image,
    })
}

fn parse_feed_item(item: &Value) -> Option<Post> {
    let id = parse_id(&item["id"]).or_else(|| parse_id(&item["pk"]))?;
    let taken_at = parse_timestamp(&item["taken_at"])?;
    let caption = item["caption"]["text"]
        .as_str()
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let pinned = item["timeline_pinned_user_ids"]
        .as_array()
        .is_some_and(|ids| !ids.is_empty());

    let media = match item["carousel_media"].as_array() {
        Some(children) => children.iter().filter_map(parse_media).collect(),
        None => parse_media(item).into_iter().collect(),
    };

    Some(Post {
        id,
        taken_at,
        caption,
        pinned,
        media,
    })
}

fn parse_feed_page(json: &Value) -> PostPage {
    let posts = json["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let post = parse_feed_item(item);
                    if post.is_none() {
                        tracing::warn!("Skipping feed item without id or timestamp");
                    }
                    post
                })
                .collect()
        })
        .unwrap_or_default();
    let next_cursor = if json["more_available"].as_bool() == Some(true) {
        json["next_max_id"].as_str().map(str::to_string)
    } else {
        None
    };
    PostPage { posts, next_cursor }
}

fn parse_reel(reel: &Value) -> Option<Story> {
    let owner = reel["user"]["username"].as_str()?.to_string();
    let items = reel["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(StoryItem {
                        id: parse_id(&item["id"]).or_else(|| parse_id(&item["pk"]))?,
                        taken_at: parse_timestamp(&item["taken_at"])?,
                        media: parse_media(item)?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(Story { owner, items })
}

/// `reels_media` answers either with a `reels` map keyed by profile id or a
/// `reels_media` list, depending on API revision.
fn parse_reels(json: &Value) -> Vec<Story> {
    if let Some(reels) = json["reels"].as_object() {
        return reels.values().filter_map(parse_reel).collect();
    }
    json["reels_media"]
        .as_array()
        .map(|reels| reels.iter().filter_map(parse_reel).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_item(id: &str, taken_at: i64) -> Value {
        json!({
            "id": id,
            "taken_at": taken_at,
            "media_type": 1,
            "caption": {"text": "hello @world"},
            "image_versions2": {"candidates": [
                {"url": format!("https://cdn.example/{id}.jpg"), "width": 1080},
                {"url": "https://cdn.example/small.jpg", "width": 320}
            ]}
        })
    }

    #[test]
    fn test_parse_profile() {
        let json = json!({"data": {"user": {"id": "12345", "username": "alice"}}});
        let profile = parse_profile("alice", &json).unwrap();
        assert_eq!(profile.id, ProfileId("12345".into()));
        assert!(parse_profile("alice", &json!({"data": {}})).is_none());
    }

    #[test]
    fn test_parse_image_post() {
        let post = parse_feed_item(&image_item("1_2", 1_704_153_600)).unwrap();
        assert_eq!(post.id, "1_2");
        assert_eq!(post.taken_at, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(post.caption.as_deref(), Some("hello @world"));
        assert!(!post.pinned);
        assert_eq!(
            post.media,
            vec![RemoteMedia {
                url: "https://cdn.example/1_2.jpg".into(),
                media_type: MediaType::Image
            }]
        );
    }

    #[test]
    fn test_parse_carousel_mixed_media() {
        let item = json!({
            "pk": 99,
            "taken_at": 1_704_153_600,
            "media_type": 8,
            "timeline_pinned_user_ids": [12345],
            "carousel_media": [
                {"media_type": 1, "image_versions2": {"candidates": [{"url": "https://cdn/a.jpg"}]}},
                {"media_type": 2, "video_versions": [{"url": "https://cdn/b.mp4"}],
                 "image_versions2": {"candidates": [{"url": "https://cdn/b-thumb.jpg"}]}}
            ]
        });
        let post = parse_feed_item(&item).unwrap();
        assert_eq!(post.id, "99");
        assert!(post.pinned);
        assert_eq!(post.caption, None);
        let types: Vec<MediaType> = post.media.iter().map(|m| m.media_type).collect();
        assert_eq!(types, vec![MediaType::Image, MediaType::Video]);
        assert_eq!(post.media[1].url, "https://cdn/b.mp4");
    }

    #[test]
    fn test_parse_feed_page_cursor() {
        let json = json!({
            "items": [image_item("a", 1_704_153_600), {"id": "broken"}],
            "more_available": true,
            "next_max_id": "cursor-2"
        });
        let page = parse_feed_page(&json);
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("cursor-2"));

        let last = parse_feed_page(&json!({"items": [], "more_available": false, "next_max_id": "x"}));
        assert!(last.posts.is_empty());
        assert_eq!(last.next_cursor, None);
    }

    #[test]
    fn test_parse_reels_both_shapes() {
        let reel = json!({
            "user": {"username": "alice"},
            "items": [
                {"id": "s1", "taken_at": 1_704_153_600, "media_type": 2,
                 "video_versions": [{"url": "https://cdn/s1.mp4"}]},
                {"id": "s2", "taken_at": 1_704_157_200, "media_type": 1,
                 "image_versions2": {"candidates": [{"url": "https://cdn/s2.jpg"}]}}
            ]
        });

        let stories = parse_reels(&json!({"reels": {"12345": reel.clone()}}));
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].owner, "alice");
        assert_eq!(stories[0].items.len(), 2);
        assert_eq!(stories[0].items[0].media.media_type, MediaType::Video);

        let stories = parse_reels(&json!({"reels_media": [reel]}));
        assert_eq!(stories.len(), 1);
        assert!(parse_reels(&json!({})).is_empty());
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/s/1_posts/2024.jpg")),
            PathBuf::from("/s/1_posts/2024.jpg.part")
        );
    }
}
