//! One-shot subcommands that run the deployment core without the daemon.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use stagehand::{ensure_dir, Deployer, RecordStore, StageConfig, VacuumReport};
use uuid::Uuid;

/// Deploy a local archive file.
///
/// Works on a copy so the operator's file stays in place, unlike HTTP
/// uploads whose buffered temp file is consumed.
pub fn deploy(config: &StageConfig, archive: &Path) -> Result<()> {
    let deployer = Deployer::new(config)?;
    ensure_dir(&config.temp_dir)?;

    let staged = config
        .temp_dir
        .join(format!("upload-{}.tar.gz", Uuid::new_v4()));
    fs::copy(archive, &staged)
        .with_context(|| format!("failed to stage {}", archive.display()))?;

    let outcome = deployer.deploy(&staged);
    let _ = fs::remove_file(&staged);

    let receipt = outcome?;
    println!("deployed {} ({})", receipt.id, receipt.state);
    println!("published -> {}", receipt.extraction.display());
    if let Some(report) = &receipt.archive_vacuum {
        print_report("archives", report);
    }
    if let Some(report) = &receipt.extract_vacuum {
        print_report("extractions", report);
    }
    Ok(())
}

/// Show the published deployment and both record stores.
pub fn status(config: &StageConfig) -> Result<()> {
    let deployer = Deployer::new(config)?;

    match deployer.publisher().current_target()? {
        Some(target) => println!("published -> {}", target.display()),
        None => println!("published -> (nothing)"),
    }
    let current = deployer.publisher().current_id()?;

    let archives = deployer.archives().list()?;
    println!("archives ({}):", archives.len());
    for id in &archives {
        println!("  {id}");
    }

    let extractions = deployer.extracts().list()?;
    println!("extractions ({}):", extractions.len());
    for id in &extractions {
        let marker = if Some(id) == current.as_ref() { " *" } else { "" };
        println!("  {id}{marker}");
    }
    Ok(())
}

/// Prune both stores down to the configured retention counts.
pub fn vacuum(config: &StageConfig) -> Result<()> {
    let deployer = Deployer::new(config)?;
    let (archives, extractions) = deployer.run_vacuum()?;
    print_report("archives", &archives);
    print_report("extractions", &extractions);
    Ok(())
}

fn print_report(label: &str, report: &VacuumReport) {
    println!(
        "{label}: examined {}, deleted {}, retained {}, failed {}",
        report.examined,
        report.deleted,
        report.retained,
        report.failed.len()
    );
}
