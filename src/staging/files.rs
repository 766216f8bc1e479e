//! Naming of the files inside a staged group.
//!
//! Media files are named after their capture instant,
//! `YYYY-MM-DD_HH-MM-SS_UTC[_N].ext`. Characters `[2, 10)` of that name are
//! the 8-character capture date (`YY-MM-DD`), which the classifier reads back
//! to build video display names. The extension carries the media type. A
//! group may also hold one `.txt` description file for the whole group.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

/// Byte range of the capture date inside a staged media file name.
const CAPTURE_DATE_RANGE: std::ops::Range<usize> = 2..10;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "heic"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];
const DESCRIPTION_EXTENSION: &str = "txt";

/// Media type of a staged file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    /// Infer the media type from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Extension used when staging a file of this type.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn timestamp_stem(taken_at: &DateTime<Utc>) -> String {
    taken_at.format("%Y-%m-%d_%H-%M-%S_UTC").to_string()
}

/// File name for one staged media file.
///
/// `index` is the 1-based position inside a multi-media post; single-media
/// items pass `None`.
pub fn media_file_name(
    taken_at: &DateTime<Utc>,
    index: Option<usize>,
    media_type: MediaType,
) -> String {
    match index {
        Some(i) => format!(
            "{}_{}.{}",
            timestamp_stem(taken_at),
            i,
            media_type.extension()
        ),
        None => format!("{}.{}", timestamp_stem(taken_at), media_type.extension()),
    }
}

/// File name of a group's description file.
pub fn description_file_name(taken_at: &DateTime<Utc>) -> String {
    format!("{}.{}", timestamp_stem(taken_at), DESCRIPTION_EXTENSION)
}

/// Whether a path is a group description file.
pub fn is_description(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DESCRIPTION_EXTENSION))
}

/// The 8-character capture date (`YY-MM-DD`) encoded in a staged file name.
pub fn capture_date(file_name: &str) -> Option<&str> {
    file_name.get(CAPTURE_DATE_RANGE)
}

/// Capture date without separators (`YYMMDD`), as shown in video names.
pub fn display_date(file_name: &str) -> Option<String> {
    capture_date(file_name).map(|d| d.replace('-', ""))
}
