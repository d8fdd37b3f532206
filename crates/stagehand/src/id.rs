//! Timestamp-derived deployment identifiers.
//!
//! An identifier is the UTC moment an upload arrived, printed as
//! `2026-08-23T15-04-05.123`: ISO-8601 shaped, with colons swapped for
//! dashes so the value works as a file name. Millisecond precision keeps
//! rapid successive uploads distinct. Every field is zero-padded, which
//! makes lexicographic order equal chronological order; the record stores
//! sort by name alone and never parse dates back out.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Identifier shape; `0` marks digit positions, everything else is literal.
const SHAPE: &[u8] = b"0000-00-00T00-00-00.000";

/// Name prefix shared by archive files and extraction directories.
const RECORD_PREFIX: &str = "archive_";

/// Suffix carried by archive files only.
const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Identifier of one deployment record.
///
/// The same identifier names the archive file, the extraction directory
/// and the deployment itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployId(String);

impl DeployId {
    /// Identifier for a deployment starting now.
    pub fn now() -> Self {
        Self::from_timestamp(Utc::now())
    }

    /// Identifier for a deployment at a specific instant.
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y-%m-%dT%H-%M-%S%.3f").to_string())
    }

    /// File name this record uses in the archive store.
    pub fn archive_file_name(&self) -> String {
        format!("{RECORD_PREFIX}{}{ARCHIVE_SUFFIX}", self.0)
    }

    /// Directory name this record uses in the extraction store.
    pub fn dir_name(&self) -> String {
        format!("{RECORD_PREFIX}{}", self.0)
    }

    /// Recover an identifier from an archive store file name.
    ///
    /// Returns `None` for names that are not archive records, so store
    /// listings can skip foreign files instead of erroring on them.
    pub fn from_archive_file_name(name: &str) -> Option<Self> {
        name.strip_prefix(RECORD_PREFIX)?
            .strip_suffix(ARCHIVE_SUFFIX)?
            .parse()
            .ok()
    }

    /// Recover an identifier from an extraction store directory name.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix(RECORD_PREFIX)?.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeployId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeployId {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid(s) {
            return Err(StageError::InvalidId {
                text: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

fn is_valid(s: &str) -> bool {
    s.len() == SHAPE.len()
        && s.bytes().zip(SHAPE).all(|(b, t)| match t {
            b'0' => b.is_ascii_digit(),
            _ => b == *t,
        })
}
