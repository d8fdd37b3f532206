//! Server startup and graceful shutdown.

use anyhow::{Context, Result};
use stagehand::StageConfig;
use tracing::info;

use crate::web::{self, AppState};

/// Everything `stagedoor serve` needs to run.
pub struct ServeConfig {
    /// Address to listen on, e.g. "127.0.0.1:8080".
    pub listen: String,
    /// Deployment target layout and retention.
    pub stage: StageConfig,
}

pub async fn run(config: ServeConfig) -> Result<()> {
    info!("🎬 stagedoor starting");
    info!("   Archives:    {}", config.stage.archive_dir.display());
    info!("   Extractions: {}", config.stage.extract_dir.display());
    info!("   Pointer:     {}", config.stage.symlink_path.display());
    info!("   Uploads:     {}", config.stage.temp_dir.display());
    info!(
        "   Retention:   {} archives, {} extractions (0 = unbounded)",
        config.stage.keep_archive, config.stage.keep_extract
    );

    let state = AppState::new(&config.stage).context("failed to open deployment target")?;
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind to {}", config.listen))?;

    info!("🎬 stagedoor ready!");
    info!("   Deploy: POST http://{}/", config.listen);
    info!("   Health: GET  http://{}/health", config.listen);
    info!("   Status: GET  http://{}/status", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
