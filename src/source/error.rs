use thiserror::Error;

use crate::retry::Retryable;

/// Failures talking to the source platform. Transient for the run: they are
/// contained to the profile being fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("HTTP error requesting {url}: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("Unexpected response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("Disk error while downloading: {0}")]
    Disk(#[from] std::io::Error),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::Http { .. } => true,
            FetchError::Malformed { .. } => false,
            FetchError::ProfileNotFound(_) => false,
            FetchError::Disk(_) => false,
        }
    }
}
