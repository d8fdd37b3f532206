//! Publisher: the atomically repointed current-deployment symlink.
//!
//! The pointer moves by creating a staged sibling symlink and renaming it
//! over the published path. rename() replaces the old link in one step, so
//! a reader resolving the pointer sees either the previous extraction or
//! the new one, never a missing or dangling link.

use std::fs;
use std::io;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};

use crate::config::ensure_dir;
use crate::error::StageError;
use crate::id::DeployId;

/// Owner of the current-deployment symlink.
#[derive(Debug, Clone)]
pub struct Publisher {
    link: PathBuf,
}

impl Publisher {
    /// Open a publisher for the pointer at `link`.
    ///
    /// Creates the parent directory if missing. An existing non-symlink at
    /// the pointer path is refused rather than replaced.
    pub fn new(link: impl Into<PathBuf>) -> Result<Self, StageError> {
        let link = link.into();
        match fs::symlink_metadata(&link) {
            Ok(meta) if meta.file_type().is_symlink() => {}
            Ok(_) => return Err(StageError::NotASymlink { path: link }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = link.parent().filter(|p| !p.as_os_str().is_empty()) {
                    ensure_dir(parent)?;
                }
            }
            Err(e) => return Err(StageError::io(link, e)),
        }
        Ok(Self { link })
    }

    pub fn link_path(&self) -> &Path {
        &self.link
    }

    /// Repoint the published symlink at `target` in one atomic step.
    ///
    /// The target must be an existing directory; only completed
    /// extractions get published.
    pub fn publish(&self, target: &Path) -> Result<(), StageError> {
        let publish_err = |source: io::Error| StageError::Publish { source };

        let meta = fs::metadata(target).map_err(publish_err)?;
        if !meta.is_dir() {
            return Err(publish_err(io::Error::other(format!(
                "{} is not a directory",
                target.display()
            ))));
        }

        let staged = self.staged_path();
        // A staged link left by an interrupted publish is stale; drop it.
        match fs::remove_file(&staged) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(publish_err(e)),
        }

        unix_fs::symlink(target, &staged).map_err(publish_err)?;
        if let Err(e) = fs::rename(&staged, &self.link) {
            let _ = fs::remove_file(&staged);
            return Err(publish_err(e));
        }
        Ok(())
    }

    /// Staging name for the pointer swap, a hidden sibling of the link.
    fn staged_path(&self) -> PathBuf {
        let name = self
            .link
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "current".to_string());
        self.link.with_file_name(format!(".{name}.staged"))
    }

    /// Target the pointer currently names, or `None` when nothing has been
    /// published yet.
    pub fn current_target(&self) -> Result<Option<PathBuf>, StageError> {
        match fs::read_link(&self.link) {
            Ok(target) => Ok(Some(target)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StageError::io(&self.link, e)),
        }
    }

    /// Identifier of the published record, when the pointer targets a
    /// record-shaped directory name.
    ///
    /// Read fresh from the filesystem on every call; retention decisions
    /// must never work from a cached value.
    pub fn current_id(&self) -> Result<Option<DeployId>, StageError> {
        let target = match self.current_target()? {
            Some(target) => target,
            None => return Ok(None),
        };
        Ok(target
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(DeployId::from_dir_name))
    }
}
