//! Deployment layout and retention configuration.
//!
//! Four paths and two retention counts describe a complete deployment
//! target. Defaults put everything under `~/.local/share/stagehand/`;
//! a TOML file or the daemon's command line can override any field.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StageError;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Configuration for one deployment target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Directory uploaded archives are persisted into.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Directory archives are extracted under, one subdirectory per record.
    #[serde(default = "default_extract_dir")]
    pub extract_dir: PathBuf,

    /// Symlink that exposes the currently published extraction.
    #[serde(default = "default_symlink_path")]
    pub symlink_path: PathBuf,

    /// Where in-flight uploads are buffered before they become records.
    /// Keep this on the same filesystem as `archive_dir` when possible;
    /// persisting is then a single rename.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Newest archives to keep when vacuuming. Zero disables archive
    /// vacuuming entirely.
    #[serde(default = "default_keep_archive")]
    pub keep_archive: usize,

    /// Newest extractions to keep when vacuuming. Zero disables.
    #[serde(default = "default_keep_extract")]
    pub keep_extract: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            extract_dir: default_extract_dir(),
            symlink_path: default_symlink_path(),
            temp_dir: default_temp_dir(),
            keep_archive: default_keep_archive(),
            keep_extract: default_keep_extract(),
        }
    }
}

/// Base directory for the default layout (~/.local/share/stagehand).
fn data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".local/share/stagehand"))
        .unwrap_or_else(|| PathBuf::from(".local/share/stagehand"))
}

fn default_archive_dir() -> PathBuf {
    data_dir().join("archives")
}

fn default_extract_dir() -> PathBuf {
    data_dir().join("extracts")
}

fn default_symlink_path() -> PathBuf {
    data_dir().join("current")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_keep_archive() -> usize {
    8
}

fn default_keep_extract() -> usize {
    4
}

impl StageConfig {
    /// Load configuration from a TOML file.
    ///
    /// The file should contain a `[stage]` section:
    /// ```toml
    /// [stage]
    /// archive_dir = "/srv/deploy/archives"
    /// extract_dir = "/srv/deploy/extracts"
    /// symlink_path = "/srv/deploy/current"
    /// keep_archive = 8
    /// keep_extract = 4
    /// ```
    ///
    /// Missing fields take their defaults; a file without a `[stage]`
    /// section yields the defaults entirely.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;

        match table.get("stage") {
            Some(section) => {
                section
                    .clone()
                    .try_into()
                    .map_err(|e: toml::de::Error| ConfigError::Parse {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })
            }
            None => Ok(Self::default()),
        }
    }

    /// Lay every path out under one root directory.
    ///
    /// Used by tests and by anyone who wants a self-contained deployment
    /// tree instead of the home-directory default.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            archive_dir: root.join("archives"),
            extract_dir: root.join("extracts"),
            symlink_path: root.join("current"),
            temp_dir: root.join("tmp"),
            keep_archive: default_keep_archive(),
            keep_extract: default_keep_extract(),
        }
    }
}

/// Create `dir` if missing; error if something that is not a directory
/// already sits at that path.
///
/// Shared by the record stores, the publisher and the upload buffer.
pub fn ensure_dir(dir: &Path) -> Result<(), StageError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StageError::NotADirectory {
            path: dir.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|source| StageError::io(dir, source))
        }
        Err(source) => Err(StageError::io(dir, source)),
    }
}
