use anyhow::Context;
use axum::{Json, Router, routing::get};
use pmoconfig::{Config, get_config};
use pmovideo::api::video_api_router;
use pmovideo::openapi::ApiDoc;
use pmovideo::{VideoConfigExt, VideoSyncService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

/// Installe le subscriber : filtre issu de la config (ou de `RUST_LOG`), console optionnelle
fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = config.get_log_enable_console().unwrap_or(true).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
    });

    tracing_subscriber::registry().with(filter).with(console).init();
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C reçu, arrêt gracieux");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();
    init_logging(&config);

    // ========== PHASE 1 : Service ==========
    let settings = config
        .video_settings()
        .context("Failed to build video settings")?;
    if settings.video_directories.is_empty() {
        warn!(
            "⚠️ No video directory configured, falling back to {:?}",
            settings.default_video_directory
        );
    }
    info!(
        data_dir = %settings.data_dir.display(),
        directories = settings.video_directories.len(),
        consistency = %settings.consistency,
        "🎬 Initializing video sync service..."
    );
    let service = Arc::new(VideoSyncService::new(settings));

    // Premier scan hors du chemin des requêtes
    let warmup = service.clone();
    let catalog = tokio::task::spawn_blocking(move || warmup.catalog()).await?;
    info!("✅ {} video(s) in catalog", catalog.total_videos);

    // ========== PHASE 2 : Routes ==========
    let app = Router::new()
        .nest("/api/video", video_api_router(service))
        .route(
            "/api-docs/video.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );

    // ========== PHASE 3 : Démarrage du serveur ==========
    let addr = SocketAddr::from(([0, 0, 0, 0], config.get_http_port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("🌐 PMOVideo listening on http://{}", addr);
    info!("Press Ctrl+C to stop...");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("PMOVideo stopped");
    Ok(())
}
