//! Deployment state machine for stagedoor.
//!
//! An upload moves through five states, each backed by one component here:
//! - **Received**: the daemon buffered the upload to a temp file
//! - **Persisted**: [`ArchiveStore`] moved it into the archive directory
//! - **Extracted**: [`ExtractStore`] unpacked it into a fresh directory
//! - **Published**: [`Publisher`] repointed the current-deployment symlink
//! - **Vacuumed**: [`vacuum`] pruned records beyond the retention counts
//!
//! [`Deployer`] ties the sequence together and reports how far each attempt
//! got.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stagehand::{Deployer, StageConfig};
//!
//! let config = StageConfig::with_root("/srv/deploy");
//! let deployer = Deployer::new(&config).unwrap();
//!
//! match deployer.deploy(std::path::Path::new("/tmp/upload.tar.gz")) {
//!     Ok(receipt) => println!("deployed {} -> {}", receipt.id, receipt.extraction.display()),
//!     Err(failure) => eprintln!("stopped after {}: {}", failure.state, failure.source),
//! }
//! ```
//!
//! # On-disk layout
//!
//! ```text
//! /srv/deploy/
//! ├── archives/
//! │   └── archive_2026-08-23T15-04-05.123.tar.gz
//! ├── extracts/
//! │   └── archive_2026-08-23T15-04-05.123/
//! └── current -> /srv/deploy/extracts/archive_2026-08-23T15-04-05.123
//! ```
//!
//! Both stores are plain directories; anything in them that does not match
//! the record naming scheme is ignored and never deleted. The symlink is
//! swapped with a rename, so readers never observe a missing pointer.

pub mod archive;
pub mod config;
pub mod deploy;
pub mod error;
pub mod extract;
pub mod id;
pub mod publish;
pub mod vacuum;

// Re-exports for convenience
pub use archive::ArchiveStore;
pub use config::{ensure_dir, ConfigError, StageConfig};
pub use deploy::{DeployFailure, DeployReceipt, DeployState, Deployer};
pub use error::StageError;
pub use extract::ExtractStore;
pub use id::DeployId;
pub use publish::Publisher;
pub use vacuum::{vacuum, RecordStore, VacuumReport};
