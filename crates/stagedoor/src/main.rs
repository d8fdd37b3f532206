//! stagedoor - deployment daemon for gzipped tar uploads
//!
//! Subcommands:
//! - `stagedoor serve` - accept uploads over HTTP and deploy each one
//! - `stagedoor deploy <archive>` - deploy a local archive directly
//! - `stagedoor status` - show the published deployment and stored records
//! - `stagedoor vacuum` - prune old records now

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use stagehand::StageConfig;

use stagedoor::{commands, serve};

#[derive(Parser)]
#[command(name = "stagedoor")]
#[command(about = "Deployment daemon: upload a tarball, flip the current symlink")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Layout and retention settings shared by every subcommand.
#[derive(Args)]
struct StageArgs {
    /// TOML config file with a [stage] section
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for persisted archives
    #[arg(long)]
    archive_dir: Option<PathBuf>,

    /// Directory for extracted deployments
    #[arg(long)]
    extract_dir: Option<PathBuf>,

    /// Path of the current-deployment symlink
    #[arg(long)]
    symlink_path: Option<PathBuf>,

    /// Directory for buffering uploads
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Archives to keep when vacuuming (0 = unbounded)
    #[arg(long)]
    keep_archive: Option<usize>,

    /// Extractions to keep when vacuuming (0 = unbounded)
    #[arg(long)]
    keep_extract: Option<usize>,
}

impl StageArgs {
    /// Defaults, then the config file, then explicit flags.
    fn resolve(&self) -> Result<StageConfig> {
        let mut config = match &self.config {
            Some(path) => StageConfig::from_file(path)?,
            None => StageConfig::default(),
        };
        if let Some(dir) = &self.archive_dir {
            config.archive_dir = dir.clone();
        }
        if let Some(dir) = &self.extract_dir {
            config.extract_dir = dir.clone();
        }
        if let Some(path) = &self.symlink_path {
            config.symlink_path = path.clone();
        }
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = dir.clone();
        }
        if let Some(keep) = self.keep_archive {
            config.keep_archive = keep;
        }
        if let Some(keep) = self.keep_extract {
            config.keep_extract = keep;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Accept archive uploads over HTTP and deploy each one
    Serve {
        #[command(flatten)]
        stage: StageArgs,

        /// Address to listen on; keep it loopback unless something in
        /// front handles access control
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: String,
    },

    /// Deploy a local archive without going through HTTP
    Deploy {
        #[command(flatten)]
        stage: StageArgs,

        /// Path to a .tar.gz file
        archive: PathBuf,
    },

    /// Show the published deployment and stored records
    Status {
        #[command(flatten)]
        stage: StageArgs,
    },

    /// Delete records beyond the retention counts
    Vacuum {
        #[command(flatten)]
        stage: StageArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match cli.command {
        Commands::Serve { stage, listen } => {
            serve::run(serve::ServeConfig {
                listen,
                stage: stage.resolve()?,
            })
            .await?;
        }
        Commands::Deploy { stage, archive } => {
            commands::deploy(&stage.resolve()?, &archive)?;
        }
        Commands::Status { stage } => {
            commands::status(&stage.resolve()?)?;
        }
        Commands::Vacuum { stage } => {
            commands::vacuum(&stage.resolve()?)?;
        }
    }

    Ok(())
}
