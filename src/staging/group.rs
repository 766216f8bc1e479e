//! Staged Group descriptor and its directory-name encoding.
//!
//! A group directory name is `<ordinal>_<kind><DELIMITER><owner>`, for example
//! `17_posts：alice`. The ordinal is the leading decimal integer, the kind
//! marker is `posts` or `stories`, and the owner is the source username. The
//! delimiter is U+FF1A FULLWIDTH COLON, which Instagram usernames cannot
//! contain and which no other file in the staging area uses, so a directory
//! is a group if and only if its name contains it.

use std::fmt;
use std::str::FromStr;

use super::error::StagingError;

/// Separates the `<ordinal>_<kind>` head from the owner username.
pub const OWNER_DELIMITER: char = '\u{FF1A}';

/// Separates the ordinal from the kind marker.
const ORDINAL_SEPARATOR: char = '_';

/// What one staged group holds: a single post, or one profile's story batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Post,
    Story,
}

impl GroupKind {
    /// Marker stored in the directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Story => "stories",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKind {
    type Err = StagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Self::Post),
            "stories" => Ok(Self::Story),
            other => Err(StagingError::InvalidGroupName(format!(
                "unknown kind marker '{}'",
                other
            ))),
        }
    }
}

/// Identity of one staged group: `(ordinal, kind, owner)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagedGroup {
    ordinal: u64,
    kind: GroupKind,
    owner: String,
}

impl StagedGroup {
    /// Build a descriptor, rejecting owners that would break the encoding.
    pub fn new(ordinal: u64, kind: GroupKind, owner: &str) -> Result<Self, StagingError> {
        if owner.is_empty()
            || owner.contains(OWNER_DELIMITER)
            || owner.contains(['/', '\\'])
        {
            return Err(StagingError::InvalidOwner(owner.to_string()));
        }
        Ok(Self {
            ordinal,
            kind,
            owner: owner.to_string(),
        })
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether a directory entry name is meant to be a staged group.
    pub fn is_group_name(name: &str) -> bool {
        name.contains(OWNER_DELIMITER)
    }

    /// Encode as a directory name.
    pub fn dir_name(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.ordinal,
            ORDINAL_SEPARATOR,
            self.kind.as_str(),
            OWNER_DELIMITER,
            self.owner
        )
    }

    /// Decode a directory name produced by [`StagedGroup::dir_name`].
    pub fn parse(name: &str) -> Result<Self, StagingError> {
        let invalid = || StagingError::InvalidGroupName(name.to_string());

        let (head, owner) = name.split_once(OWNER_DELIMITER).ok_or_else(invalid)?;
        let (ordinal, kind) = head.split_once(ORDINAL_SEPARATOR).ok_or_else(invalid)?;
        if ordinal.is_empty() || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let ordinal: u64 = ordinal.parse().map_err(|_| invalid())?;
        let kind: GroupKind = kind.parse().map_err(|_| invalid())?;
        Self::new(ordinal, kind, owner).map_err(|_| invalid())
    }
}

impl fmt::Display for StagedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}
