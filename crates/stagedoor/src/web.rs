//! HTTP surface: one POST endpoint that deploys an uploaded archive,
//! plus health and status for operators.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde::Serialize;
use stagehand::{
    ensure_dir, DeployFailure, DeployId, Deployer, RecordStore, StageConfig, StageError,
};
use tokio::io::AsyncWriteExt;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    deployer: Arc<Deployer>,
    config: Arc<StageConfig>,
    /// One deployment in flight at a time; uploads that lose the race
    /// are turned away, not queued.
    deploy_lock: Arc<tokio::sync::Mutex<()>>,
    started: Instant,
}

impl AppState {
    /// Open the deployment target and the upload buffer directory.
    pub fn new(config: &StageConfig) -> Result<Self, StageError> {
        let deployer = Deployer::new(config)?;
        ensure_dir(&config.temp_dir)?;
        Ok(Self {
            deployer: Arc::new(deployer),
            config: Arc::new(config.clone()),
            deploy_lock: Arc::new(tokio::sync::Mutex::new(())),
            started: Instant::now(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(deploy_archive))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept an uploaded gzipped tarball and run the full deployment
/// sequence on it.
///
/// The upload is buffered to a temp file before any stage runs, so a
/// slow or broken client cannot leave a half-written record behind.
/// A second upload arriving while a deployment is in flight gets 503
/// before its body is read.
#[tracing::instrument(name = "http.deploy", skip(state, request))]
async fn deploy_archive(State(state): State<AppState>, request: Request) -> Response {
    let guard = match state.deploy_lock.clone().try_lock_owned() {
        Ok(guard) => guard,
        Err(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "Busy: another deployment is in flight\n",
            )
                .into_response();
        }
    };

    let temp = state
        .config
        .temp_dir
        .join(format!("upload-{}.tar.gz", Uuid::new_v4()));

    if let Err(error) = buffer_body(request.into_body(), &temp).await {
        tracing::error!(error = %error, "Failed to buffer upload");
        let _ = tokio::fs::remove_file(&temp).await;
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed: {error:#}\n"),
        )
            .into_response();
    }

    let deployer = state.deployer.clone();
    let upload = temp.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let outcome = deployer.deploy(&upload);
        drop(guard);
        outcome
    })
    .await;

    // A successful persist consumes the temp file; anything still here
    // is an upload that never became a record.
    let _ = tokio::fs::remove_file(&temp).await;

    match outcome {
        Ok(Ok(receipt)) => {
            tracing::info!(
                deploy.id = %receipt.id,
                state = %receipt.state,
                "Deployment succeeded"
            );
            (StatusCode::OK, "Success\n").into_response()
        }
        Ok(Err(failure)) => {
            tracing::error!(error = %failure, "Deployment failed");
            (failure_status(&failure), format!("Failed: {failure}\n")).into_response()
        }
        Err(join_error) => {
            tracing::error!(error = %join_error, "Deployment task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed: internal error\n").into_response()
        }
    }
}

/// Map a failed deployment to a response status.
///
/// Hostile archives are the client's fault, replayed identifiers are a
/// conflict, everything else is on us.
fn failure_status(failure: &DeployFailure) -> StatusCode {
    match failure.source {
        StageError::UnsafeArchive { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StageError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Stream the request body into `path`.
async fn buffer_body(body: Body, path: &Path) -> anyhow::Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .context("failed to create upload buffer")?;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("failed to read upload body")?;
        file.write_all(&chunk)
            .await
            .context("failed to write upload buffer")?;
    }
    file.flush().await.context("failed to flush upload buffer")?;
    Ok(())
}

/// Liveness probe with a little context.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.deployer.publisher().current_id().ok().flatten();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started.elapsed().as_secs(),
        "current": current.map(|id| id.to_string()),
    }))
}

/// Full deployment picture for operators.
#[derive(Serialize)]
struct StatusResponse {
    current_target: Option<String>,
    current_id: Option<DeployId>,
    archives: Vec<DeployId>,
    extractions: Vec<DeployId>,
    keep_archive: usize,
    keep_extract: usize,
}

#[tracing::instrument(name = "http.status", skip(state))]
async fn status(State(state): State<AppState>) -> Response {
    let archives = match state.deployer.archives().list() {
        Ok(ids) => ids,
        Err(error) => return status_error(error),
    };
    let extractions = match state.deployer.extracts().list() {
        Ok(ids) => ids,
        Err(error) => return status_error(error),
    };
    let current_target = match state.deployer.publisher().current_target() {
        Ok(target) => target.map(|path| path.display().to_string()),
        Err(error) => return status_error(error),
    };
    let current_id = state.deployer.publisher().current_id().ok().flatten();

    let response = StatusResponse {
        current_target,
        current_id,
        archives,
        extractions,
        keep_archive: state.config.keep_archive,
        keep_extract: state.config.keep_extract,
    };
    (StatusCode::OK, Json(response)).into_response()
}

fn status_error(error: StageError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": error.to_string() })),
    )
        .into_response()
}
