//! End-to-end tests that drive the full deployment sequence through
//! the HTTP surface:
//! - upload, extraction and pointer swap
//! - retention across successive deployments
//! - rejection of hostile and malformed archives
//! - pointer visibility for concurrent readers while deployments run

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use stagedoor::web::{self, AppState};
use stagehand::StageConfig;
use tempfile::TempDir;
use tower::ServiceExt;

/// Build a well-formed gzipped tarball from (path, contents) pairs.
fn tarball(files: &[(&str, &str)]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, contents.as_bytes())?;
    }
    Ok(builder.into_inner()?.finish()?)
}

/// Build a tarball whose member name would never survive the builder's
/// own validation, by writing the raw header bytes directly.
fn hostile_tarball(name_bytes: &[u8], contents: &[u8]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    {
        let name = &mut header.as_old_mut().name;
        name[..name_bytes.len()].copy_from_slice(name_bytes);
    }
    header.set_cksum();
    builder.append(&header, contents)?;
    Ok(builder.into_inner()?.finish()?)
}

async fn post_archive(app: Router, bytes: Vec<u8>) -> Result<(StatusCode, String)> {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .body(Body::from(bytes))?,
        )
        .await?;
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}

#[tokio::test]
async fn test_deploy_round_trip_with_retention() -> Result<()> {
    let tmp = TempDir::new()?;
    let mut config = StageConfig::with_root(tmp.path().join("stage"));
    config.keep_archive = 2;
    config.keep_extract = 1;
    let app = web::router(AppState::new(&config)?);

    let (status, body) = post_archive(
        app.clone(),
        tarball(&[("VERSION", "1"), ("app/run.sh", "#!/bin/sh\n")])?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Success\n");
    assert_eq!(fs::read_to_string(config.symlink_path.join("VERSION"))?, "1");
    assert_eq!(
        fs::read_to_string(config.symlink_path.join("app/run.sh"))?,
        "#!/bin/sh\n"
    );

    // Identifiers are millisecond-grained; do not race the clock.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (status, _) = post_archive(app.clone(), tarball(&[("VERSION", "2")])?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fs::read_to_string(config.symlink_path.join("VERSION"))?, "2");

    tokio::time::sleep(Duration::from_millis(5)).await;
    let (status, _) = post_archive(app, tarball(&[("VERSION", "3")])?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fs::read_to_string(config.symlink_path.join("VERSION"))?, "3");

    // Retention: two newest archives, only the published extraction.
    assert_eq!(fs::read_dir(&config.archive_dir)?.count(), 2);
    assert_eq!(fs::read_dir(&config.extract_dir)?.count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_hostile_archive_is_unprocessable() -> Result<()> {
    let tmp = TempDir::new()?;
    let config = StageConfig::with_root(tmp.path().join("stage"));
    let app = web::router(AppState::new(&config)?);

    let (status, body) =
        post_archive(app, hostile_tarball(b"../../escape.txt", b"gotcha")?).await?;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.starts_with("Failed:"));
    // The archive is kept for inspection; nothing was extracted or
    // published, and nothing escaped the extraction root.
    assert_eq!(fs::read_dir(&config.archive_dir)?.count(), 1);
    assert_eq!(fs::read_dir(&config.extract_dir)?.count(), 0);
    assert!(fs::symlink_metadata(&config.symlink_path).is_err());
    assert!(!tmp.path().join("stage/escape.txt").exists());
    Ok(())
}

#[tokio::test]
async fn test_empty_upload_fails_cleanly() -> Result<()> {
    let tmp = TempDir::new()?;
    let config = StageConfig::with_root(tmp.path().join("stage"));
    let app = web::router(AppState::new(&config)?);

    let (status, body) = post_archive(app, Vec::new()).await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Failed:"));
    assert!(fs::symlink_metadata(&config.symlink_path).is_err());
    Ok(())
}

#[tokio::test]
async fn test_keep_zero_never_vacuums() -> Result<()> {
    let tmp = TempDir::new()?;
    let mut config = StageConfig::with_root(tmp.path().join("stage"));
    config.keep_archive = 0;
    config.keep_extract = 0;
    let app = web::router(AppState::new(&config)?);

    for version in ["1", "2", "3"] {
        let (status, _) = post_archive(app.clone(), tarball(&[("VERSION", version)])?).await?;
        assert_eq!(status, StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(fs::read_dir(&config.archive_dir)?.count(), 3);
    assert_eq!(fs::read_dir(&config.extract_dir)?.count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_pointer_always_resolves_during_redeploys() -> Result<()> {
    let tmp = TempDir::new()?;
    let mut config = StageConfig::with_root(tmp.path().join("stage"));
    config.keep_archive = 0;
    config.keep_extract = 0;
    let app = web::router(AppState::new(&config)?);

    let (status, _) = post_archive(app.clone(), tarball(&[("VERSION", "1")])?).await?;
    assert_eq!(status, StatusCode::OK);

    // A reader hammering the pointer must see a complete deployment at
    // every observation, no matter how many swaps happen underneath.
    let link = config.symlink_path.clone();
    let stop = Arc::new(AtomicBool::new(false));
    let reader_stop = stop.clone();
    let reader = std::thread::spawn(move || {
        let mut observations = 0u64;
        let mut failures = 0u64;
        loop {
            match fs::read_to_string(link.join("VERSION")) {
                Ok(_) => observations += 1,
                Err(_) => failures += 1,
            }
            if reader_stop.load(Ordering::Relaxed) {
                break;
            }
        }
        (observations, failures)
    });

    for version in ["2", "3", "4"] {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let (status, _) = post_archive(app.clone(), tarball(&[("VERSION", version)])?).await?;
        assert_eq!(status, StatusCode::OK);
    }

    stop.store(true, Ordering::Relaxed);
    let (observations, failures) = match reader.join() {
        Ok(counts) => counts,
        Err(_) => anyhow::bail!("reader thread panicked"),
    };
    assert!(observations > 0);
    assert_eq!(failures, 0, "pointer must resolve at every observation");
    Ok(())
}
