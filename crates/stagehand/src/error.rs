//! Error taxonomy for the deployment core.
//!
//! Every variant tells the caller which stage gave up and what is left on
//! disk. Coordinator-level reporting (which state a failed deployment
//! reached) lives in [`crate::deploy::DeployFailure`].

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::id::DeployId;

#[derive(Debug, Error)]
pub enum StageError {
    /// The uploaded file could not be moved into the archive store.
    /// No archive record exists after this error.
    #[error("failed to persist archive: {source}")]
    Persist { source: io::Error },

    /// Unpacking the archive failed. The partial extraction directory has
    /// been removed; the archive record is untouched.
    #[error("failed to extract archive {id}: {source}")]
    Extract { id: DeployId, source: io::Error },

    /// An archive member would resolve outside the extraction directory.
    #[error("archive member {member:?} escapes the extraction directory")]
    UnsafeArchive { member: String },

    /// A record with this identifier already exists.
    #[error("record {id} already exists")]
    Conflict { id: DeployId },

    /// The current-deployment symlink could not be updated. The previous
    /// pointer, if any, is still in place.
    #[error("failed to publish symlink: {source}")]
    Publish { source: io::Error },

    /// A configured store path exists but is not a directory.
    #[error("{path} exists and is not a directory")]
    NotADirectory { path: PathBuf },

    /// The configured pointer path exists but is not a symlink.
    #[error("{path} exists and is not a symlink")]
    NotASymlink { path: PathBuf },

    /// A string does not have the shape of a deployment identifier.
    #[error("invalid deployment id {text:?}")]
    InvalidId { text: String },

    /// Listing, stat or delete failed somewhere a more specific variant
    /// does not apply.
    #[error("i/o error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl StageError {
    /// Shorthand for the catch-all [`StageError::Io`] variant.
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
