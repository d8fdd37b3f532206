//! ArchiveStore: the directory of persisted deployment archives.
//!
//! Layout:
//! ```text
//! {archive_dir}/
//! ├── archive_2026-08-23T15-04-05.123.tar.gz
//! └── archive_2026-08-23T16-11-52.904.tar.gz
//! ```
//!
//! Records are immutable once persisted. An upload becomes a record through
//! a rename of its buffered temp file, so a half-written file is never
//! visible under a record name. Files that do not match the record naming
//! scheme are left alone by both listing and vacuum.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ensure_dir;
use crate::error::StageError;
use crate::id::DeployId;
use crate::vacuum::RecordStore;

/// Store of uploaded archives, one gzipped tar per deployment.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    dir: PathBuf,
}

impl ArchiveStore {
    /// Open the store, creating its directory if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StageError> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a record with this identifier occupies, whether or not it
    /// currently exists.
    pub fn path(&self, id: &DeployId) -> PathBuf {
        self.dir.join(id.archive_file_name())
    }

    pub fn contains(&self, id: &DeployId) -> bool {
        self.path(id).exists()
    }

    /// Persist the uploaded file at `temp` as a new record under a fresh
    /// identifier. Consumes the temp file on success.
    pub fn persist(&self, temp: &Path) -> Result<DeployId, StageError> {
        self.persist_as(temp, DeployId::now())
    }

    /// Persist under a caller-chosen identifier.
    ///
    /// This attempts a rename() first (atomic on the same filesystem) and
    /// falls back to copy+unlink across filesystems. On any failure the
    /// store holds no record for `id` afterwards.
    pub fn persist_as(&self, temp: &Path, id: DeployId) -> Result<DeployId, StageError> {
        let target = self.path(&id);
        if target.exists() {
            return Err(StageError::Conflict { id });
        }

        match fs::rename(temp, &target) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                // Cross-filesystem: fall back to copy + unlink. Remove the
                // copy if either half fails, so a failed persist still
                // leaves no record behind.
                if let Err(e) = fs::copy(temp, &target).and_then(|_| fs::remove_file(temp)) {
                    let _ = fs::remove_file(&target);
                    return Err(StageError::Persist { source: e });
                }
            }
            Err(e) => return Err(StageError::Persist { source: e }),
        }

        Ok(id)
    }
}

impl RecordStore for ArchiveStore {
    fn kind(&self) -> &'static str {
        "archive"
    }

    fn list(&self) -> Result<Vec<DeployId>, StageError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StageError::io(&self.dir, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StageError::io(&self.dir, e))?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(DeployId::from_archive_file_name)
            {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &DeployId) -> Result<(), StageError> {
        let path = self.path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StageError::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    fn write_temp_upload(dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, b"tarball bytes")?;
        Ok(path)
    }

    #[test]
    fn test_new_creates_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("archives");

        let store = ArchiveStore::new(&dir)?;
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir);
        Ok(())
    }

    #[test]
    fn test_new_rejects_file_at_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("archives");
        fs::write(&path, "in the way")?;

        assert!(matches!(
            ArchiveStore::new(&path),
            Err(StageError::NotADirectory { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_persist_moves_upload_into_store() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = ArchiveStore::new(temp_dir.path().join("archives"))?;
        let upload = write_temp_upload(temp_dir.path(), "upload.tar.gz")?;

        let id = store.persist(&upload)?;

        assert!(!upload.exists(), "temp file should be consumed");
        assert!(store.contains(&id));
        assert_eq!(fs::read(store.path(&id))?, b"tarball bytes");
        Ok(())
    }

    #[test]
    fn test_persist_as_conflict() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = ArchiveStore::new(temp_dir.path().join("archives"))?;
        let id: DeployId = "2026-08-23T15-04-05.123".parse()?;

        let first = write_temp_upload(temp_dir.path(), "first.tar.gz")?;
        store.persist_as(&first, id.clone())?;

        let second = write_temp_upload(temp_dir.path(), "second.tar.gz")?;
        let result = store.persist_as(&second, id.clone());

        assert!(matches!(result, Err(StageError::Conflict { .. })));
        // The losing upload is not consumed and the record is untouched.
        assert!(second.exists());
        assert_eq!(fs::read(store.path(&id))?, b"tarball bytes");
        Ok(())
    }

    #[test]
    fn test_persist_missing_temp_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = ArchiveStore::new(temp_dir.path().join("archives"))?;

        let result = store.persist(&temp_dir.path().join("never-written.tar.gz"));
        assert!(matches!(result, Err(StageError::Persist { .. })));
        Ok(())
    }

    #[test]
    fn test_list_sorted_and_filtered() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = ArchiveStore::new(temp_dir.path().join("archives"))?;

        // Persist out of chronological order.
        for stamp in ["2026-08-23T12-00-00.500", "2026-08-23T09-15-30.000"] {
            let upload = write_temp_upload(temp_dir.path(), "u.tar.gz")?;
            store.persist_as(&upload, stamp.parse()?)?;
        }
        // Foreign files in the store directory are not records.
        fs::write(store.dir().join("README"), "hands off")?;
        fs::write(store.dir().join("archive_bogus.tar.gz"), "not a record")?;

        let ids = store.list()?;
        let names: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(
            names,
            vec!["2026-08-23T09-15-30.000", "2026-08-23T12-00-00.500"]
        );
        Ok(())
    }

    #[test]
    fn test_delete_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = ArchiveStore::new(temp_dir.path().join("archives"))?;

        let upload = write_temp_upload(temp_dir.path(), "u.tar.gz")?;
        let id = store.persist(&upload)?;

        store.delete(&id)?;
        assert!(!store.contains(&id));

        // Deleting again is not an error.
        store.delete(&id)?;
        Ok(())
    }
}
