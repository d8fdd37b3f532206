//! The deployment transaction: persist, extract, publish, vacuum.
//!
//! One [`Deployer`] owns the record stores and the publisher for a single
//! deployment target and drives each upload through the full sequence.
//! Every attempt ends as a [`DeployReceipt`] or a [`DeployFailure`] naming
//! the last state it reached; nothing unwinds silently.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::archive::ArchiveStore;
use crate::config::StageConfig;
use crate::error::StageError;
use crate::extract::ExtractStore;
use crate::id::DeployId;
use crate::publish::Publisher;
use crate::vacuum::{vacuum, VacuumReport};

/// States a deployment attempt moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeployState {
    /// Upload buffered, nothing persisted yet.
    Received,
    /// Archive record written.
    Persisted,
    /// Extraction directory complete.
    Extracted,
    /// Pointer repointed at the new extraction.
    Published,
    /// Retention ran after publication.
    Vacuumed,
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployState::Received => "received",
            DeployState::Persisted => "persisted",
            DeployState::Extracted => "extracted",
            DeployState::Published => "published",
            DeployState::Vacuumed => "vacuumed",
        };
        f.write_str(name)
    }
}

/// A successful deployment.
#[derive(Debug)]
pub struct DeployReceipt {
    pub id: DeployId,
    /// Extraction directory the pointer now targets.
    pub extraction: PathBuf,
    /// `Vacuumed` when retention ran, `Published` when it could not. The
    /// deployment itself succeeded either way.
    pub state: DeployState,
    pub archive_vacuum: Option<VacuumReport>,
    pub extract_vacuum: Option<VacuumReport>,
}

/// A failed deployment attempt: the last state it reached and the stage
/// error that stopped it there.
#[derive(Debug, Error)]
#[error("deployment failed after reaching {state}: {source}")]
pub struct DeployFailure {
    pub state: DeployState,
    #[source]
    pub source: StageError,
}

/// Drives uploads through persist, extract, publish and vacuum.
pub struct Deployer {
    archives: ArchiveStore,
    extracts: ExtractStore,
    publisher: Publisher,
    keep_archive: usize,
    keep_extract: usize,
}

impl Deployer {
    /// Open every component of the deployment target described by `config`.
    ///
    /// Store directories are created if missing. A non-directory where a
    /// store belongs, or a non-symlink at the pointer path, is refused
    /// here, before any upload is accepted.
    pub fn new(config: &StageConfig) -> Result<Self, StageError> {
        Ok(Self {
            archives: ArchiveStore::new(&config.archive_dir)?,
            extracts: ExtractStore::new(&config.extract_dir)?,
            publisher: Publisher::new(&config.symlink_path)?,
            keep_archive: config.keep_archive,
            keep_extract: config.keep_extract,
        })
    }

    pub fn archives(&self) -> &ArchiveStore {
        &self.archives
    }

    pub fn extracts(&self) -> &ExtractStore {
        &self.extracts
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Run one deployment from the uploaded file at `temp`.
    ///
    /// On success the temp file has been consumed. On failure, everything
    /// already durable stays where it is: an archive whose extraction
    /// failed remains stored, an extraction whose publish failed remains
    /// on disk. Only the failing stage cleans up its own partial output.
    pub fn deploy(&self, temp: &Path) -> Result<DeployReceipt, DeployFailure> {
        let id = self.archives.persist(temp).map_err(|source| DeployFailure {
            state: DeployState::Received,
            source,
        })?;
        tracing::info!(deploy.id = %id, "Archive persisted");

        let extraction = self
            .extracts
            .extract(&self.archives.path(&id), &id)
            .map_err(|source| DeployFailure {
                state: DeployState::Persisted,
                source,
            })?;
        tracing::info!(deploy.id = %id, "Archive extracted");

        self.publisher
            .publish(&extraction)
            .map_err(|source| DeployFailure {
                state: DeployState::Extracted,
                source,
            })?;
        tracing::info!(
            deploy.id = %id,
            target = %extraction.display(),
            "Deployment published"
        );

        // Published is the point of success. Vacuum trouble after it is
        // logged and carried in the receipt, never fatal.
        let (state, archive_vacuum, extract_vacuum) = match self.run_vacuum() {
            Ok((archives, extracts)) => (DeployState::Vacuumed, Some(archives), Some(extracts)),
            Err(error) => {
                tracing::warn!(
                    deploy.id = %id,
                    error = %error,
                    "Vacuum skipped after publish"
                );
                (DeployState::Published, None, None)
            }
        };

        Ok(DeployReceipt {
            id,
            extraction,
            state,
            archive_vacuum,
            extract_vacuum,
        })
    }

    /// Vacuum both stores, protecting whatever the pointer targets right
    /// now. The pointer is re-read from disk on every pass.
    pub fn run_vacuum(&self) -> Result<(VacuumReport, VacuumReport), StageError> {
        let protected = self.publisher.current_id()?;
        let archives = vacuum(&self.archives, self.keep_archive, protected.as_ref())?;
        let extracts = vacuum(&self.extracts, self.keep_extract, protected.as_ref())?;
        Ok((archives, extracts))
    }
}
