use thiserror::Error;

use crate::retry::Retryable;

/// VK API error codes worth another attempt: unknown error, too many
/// requests per second, flood control, internal server error.
const RETRYABLE_API_CODES: [i64; 4] = [1, 6, 9, 10];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error requesting {url}: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("VK API error {code} in {method}: {message}")]
    Api {
        method: String,
        code: i64,
        message: String,
    },

    #[error("Unexpected response from {context}: {reason}")]
    Malformed { context: String, reason: String },

    /// `video.save` succeeded but the file never reached the upload server.
    /// Retrying the whole upload would create another empty entry.
    #[error("Video {video} was created but its file upload failed: {source}")]
    VideoFile {
        video: String,
        source: Box<UploadError>,
    },

    #[error("Cannot read {path}: {source}")]
    Disk {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

impl Retryable for UploadError {
    fn is_retryable(&self) -> bool {
        match self {
            UploadError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            UploadError::Http { .. } => true,
            UploadError::Api { code, .. } => RETRYABLE_API_CODES.contains(code),
            UploadError::Malformed { .. }
            | UploadError::VideoFile { .. }
            | UploadError::Disk { .. } => false,
        }
    }
}
