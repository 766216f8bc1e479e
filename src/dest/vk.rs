//! VK implementation of [`DestinationClient`].

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde_json::Value;
use tokio_util::io::ReaderStream;

use super::{DestinationClient, UploadError, UploadKind, UploadRef};
use crate::retry::{retry_remote, RetryConfig};
use crate::routing::AlbumRef;

const API_BASE: &str = "https://api.vk.com/method";
const API_VERSION: &str = "5.131";

pub struct VkClient {
    client: Client,
    token: String,
    api_base: String,
    timeout: Duration,
    /// Retries of the video file POST alone, after `video.save`.
    file_retry: RetryConfig,
}

impl std::fmt::Debug for VkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VkClient")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl VkClient {
    /// `timeout` bounds API calls; file uploads are only bounded by the
    /// connect timeout since videos can be large.
    pub fn new(token: &str, timeout: Duration, file_retry: RetryConfig) -> anyhow::Result<Self> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.to_string(),
            api_base: API_BASE.to_string(),
            timeout,
            file_retry,
        })
    }

    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, UploadError> {
        let url = format!("{}/{}", self.api_base, method);
        let mut form: Vec<(&str, String)> = vec![
            ("access_token", self.token.clone()),
            ("v", API_VERSION.to_string()),
        ];
        form.extend(params.iter().cloned());

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| UploadError::Http {
                source: e,
                url: url.clone(),
            })?;
        if !response.status().is_success() {
            return Err(UploadError::HttpStatus {
                status: response.status().as_u16(),
                url,
            });
        }
        let json: Value = response
            .json()
            .await
            .map_err(|e| UploadError::Http { source: e, url })?;
        api_response(method, json)
    }

    /// POST the file as a multipart form field, streamed from disk.
    async fn post_file(&self, upload_url: &str, field: &str, file: &Path) -> Result<Value, UploadError> {
        let disk_err = |source: std::io::Error| UploadError::Disk {
            path: file.to_path_buf(),
            source,
        };
        let handle = tokio::fs::File::open(file).await.map_err(disk_err)?;
        let len = handle.metadata().await.map_err(disk_err)?.len();
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(handle)), len)
            .file_name(file_name);
        let form = Form::new().part(field.to_string(), part);

        let response = self
            .client
            .post(upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Http {
                source: e,
                url: upload_url.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(UploadError::HttpStatus {
                status: response.status().as_u16(),
                url: upload_url.to_string(),
            });
        }
        let json: Value = response.json().await.map_err(|e| UploadError::Http {
            source: e,
            url: upload_url.to_string(),
        })?;
        if let Some(err) = json.get("error") {
            return Err(UploadError::Malformed {
                context: "upload server".to_string(),
                reason: err.to_string(),
            });
        }
        Ok(json)
    }
}

#[async_trait::async_trait]
impl DestinationClient for VkClient {
    async fn upload_photo(
        &self,
        file: &Path,
        caption: Option<&str>,
        album: AlbumRef,
    ) -> Result<UploadRef, UploadError> {
        let server = self
            .call(
                "photos.getUploadServer",
                &[
                    ("group_id", album.group_id.to_string()),
                    ("album_id", album.album_id.to_string()),
                ],
            )
            .await?;
        let upload_url = str_field(&server, "upload_url", "photos.getUploadServer")?;

        let uploaded = self.post_file(upload_url, "file1", file).await?;
        let photos_list = str_field(&uploaded, "photos_list", "photo upload")?;
        if photos_list.is_empty() || photos_list == "[]" {
            return Err(UploadError::Malformed {
                context: "photo upload".to_string(),
                reason: "server accepted no photos".to_string(),
            });
        }

        let mut params = vec![
            ("group_id", album.group_id.to_string()),
            ("album_id", album.album_id.to_string()),
            ("server", uploaded["server"].to_string()),
            ("photos_list", photos_list.to_string()),
            ("hash", str_field(&uploaded, "hash", "photo upload")?.to_string()),
        ];
        if let Some(caption) = caption {
            params.push(("caption", caption.to_string()));
        }
        let saved = self.call("photos.save", &params).await?;
        parse_saved_photo(&saved)
    }

    async fn upload_video(
        &self,
        file: &Path,
        name: &str,
        description: Option<&str>,
        album: AlbumRef,
    ) -> Result<UploadRef, UploadError> {
        let mut params = vec![
            ("name", name.to_string()),
            ("group_id", album.group_id.to_string()),
            ("album_id", album.album_id.to_string()),
        ];
        if let Some(description) = description {
            params.push(("description", description.to_string()));
        }
        let saved = self.call("video.save", &params).await?;
        let (upload_url, upload_ref) = parse_video_save(&saved)?;
        let label = format!("Posting video file {}", file.display());
        retry_remote(&self.file_retry, &label, || {
            self.post_file(&upload_url, "video_file", file)
        })
        .await
        .map_err(|e| UploadError::VideoFile {
            video: upload_ref.url(),
            source: Box::new(e),
        })?;
        Ok(upload_ref)
    }
}

/// Unwrap the `response` member of an API reply, mapping `error` replies.
fn api_response(method: &str, json: Value) -> Result<Value, UploadError> {
    if let Some(error) = json.get("error") {
        return Err(UploadError::Api {
            method: method.to_string(),
            code: error["error_code"].as_i64().unwrap_or(0),
            message: error["error_msg"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match json {
        Value::Object(mut map) => map.remove("response").ok_or_else(|| UploadError::Malformed {
            context: method.to_string(),
            reason: "missing response".to_string(),
        }),
        _ => Err(UploadError::Malformed {
            context: method.to_string(),
            reason: "reply is not an object".to_string(),
        }),
    }
}

fn str_field<'a>(json: &'a Value, field: &str, context: &str) -> Result<&'a str, UploadError> {
    json[field].as_str().ok_or_else(|| UploadError::Malformed {
        context: context.to_string(),
        reason: format!("missing {}", field),
    })
}

fn int_field(json: &Value, field: &str, context: &str) -> Result<i64, UploadError> {
    json[field].as_i64().ok_or_else(|| UploadError::Malformed {
        context: context.to_string(),
        reason: format!("missing {}", field),
    })
}

fn parse_saved_photo(saved: &Value) -> Result<UploadRef, UploadError> {
    let photo = &saved[0];
    Ok(UploadRef {
        kind: UploadKind::Photo,
        owner_id: int_field(photo, "owner_id", "photos.save")?,
        id: int_field(photo, "id", "photos.save")?,
    })
}

fn parse_video_save(saved: &Value) -> Result<(String, UploadRef), UploadError> {
    let upload_url = str_field(saved, "upload_url", "video.save")?.to_string();
    let upload_ref = UploadRef {
        kind: UploadKind::Video,
        owner_id: int_field(saved, "owner_id", "video.save")?,
        id: int_field(saved, "video_id", "video.save")?,
    };
    Ok((upload_url, upload_ref))
}
