//! ExtractStore: extracted deployment trees, one directory per record.
//!
//! Layout:
//! ```text
//! {extract_dir}/
//! ├── archive_2026-08-23T15-04-05.123/
//! │   ├── app/...
//! │   └── VERSION
//! └── archive_2026-08-23T16-11-52.904/
//!     └── ...
//! ```
//!
//! Extraction is all-or-nothing: the record directory either holds the
//! complete archive contents or does not exist. Members are checked before
//! unpacking; anything that would resolve outside the record directory
//! fails the whole extraction.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;

use crate::config::ensure_dir;
use crate::error::StageError;
use crate::id::DeployId;
use crate::vacuum::RecordStore;

/// Store of extracted deployment trees.
#[derive(Debug, Clone)]
pub struct ExtractStore {
    dir: PathBuf,
}

impl ExtractStore {
    /// Open the store, creating its directory if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StageError> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory a record with this identifier occupies, whether or not it
    /// currently exists.
    pub fn path(&self, id: &DeployId) -> PathBuf {
        self.dir.join(id.dir_name())
    }

    pub fn contains(&self, id: &DeployId) -> bool {
        self.path(id).is_dir()
    }

    /// Unpack the gzipped tar at `archive` into a fresh directory for `id`.
    ///
    /// Returns the extraction directory. On any failure the partially
    /// written directory is removed before the error is returned.
    pub fn extract(&self, archive: &Path, id: &DeployId) -> Result<PathBuf, StageError> {
        let dest = self.path(id);
        if dest.exists() {
            return Err(StageError::Conflict { id: id.clone() });
        }

        fs::create_dir(&dest).map_err(|e| StageError::Extract {
            id: id.clone(),
            source: e,
        })?;

        match unpack_into(archive, &dest, id) {
            Ok(()) => Ok(dest),
            Err(err) => {
                // All-or-nothing: a half-written directory must never be
                // mistaken for a complete extraction.
                if let Err(cleanup) = fs::remove_dir_all(&dest) {
                    tracing::warn!(
                        path = %dest.display(),
                        error = %cleanup,
                        "Failed to remove partial extraction"
                    );
                }
                Err(err)
            }
        }
    }
}

fn unpack_into(archive: &Path, dest: &Path, id: &DeployId) -> Result<(), StageError> {
    let failed = |source: io::Error| StageError::Extract {
        id: id.clone(),
        source,
    };

    let file = fs::File::open(archive).map_err(failed)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    for entry in tar.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let member = entry.path().map_err(failed)?.into_owned();
        check_member(&member)?;

        // unpack_in re-checks that the joined destination stays under
        // `dest`, covering anything the component scan missed.
        let unpacked = entry.unpack_in(dest).map_err(failed)?;
        if !unpacked {
            return Err(unsafe_member(&member));
        }
    }

    Ok(())
}

/// Reject members that could resolve outside the extraction directory.
fn check_member(member: &Path) -> Result<(), StageError> {
    if member.is_absolute() {
        return Err(unsafe_member(member));
    }
    for component in member.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_member(member));
            }
            Component::Normal(_) | Component::CurDir => {}
        }
    }
    Ok(())
}

fn unsafe_member(member: &Path) -> StageError {
    StageError::UnsafeArchive {
        member: member.display().to_string(),
    }
}

impl RecordStore for ExtractStore {
    fn kind(&self) -> &'static str {
        "extraction"
    }

    fn list(&self) -> Result<Vec<DeployId>, StageError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StageError::io(&self.dir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StageError::io(&self.dir, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| StageError::io(entry.path(), e))?
                .is_dir();
            if !is_dir {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(DeployId::from_dir_name) {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &DeployId) -> Result<(), StageError> {
        let path = self.path(id);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StageError::io(path, e)),
        }
    }
}
