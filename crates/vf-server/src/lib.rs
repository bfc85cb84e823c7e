//! vf-server: HTTP API server and background transcode workers.
//!
//! This crate ties the other vf-* crates into a running application:
//!
//! - Axum-based HTTP API serving playlists, segments, previews, thumbnails,
//!   and catalog management
//! - The transcode scheduler deciding between cached output, continuous
//!   encoders, and one-shot segment encodes
//! - An in-process job queue with unique job ids for continuous workers,
//!   post-upload pipelines, and preview encodes
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod jobs;
pub mod metadata;
pub mod post_upload;
pub mod router;
pub mod routes;
pub mod scheduler;

use vf_core::config::Config;

use crate::context::AppContext;

/// Start the videoflix server.
///
/// This is the main entry point. It initializes the database, constructs
/// the [`AppContext`], and serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config) -> vf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    // Initialize database.
    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy().to_string();
    let db = vf_db::pool::init_pool(&db_str)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let ctx = AppContext::new(db, config);

    // Report external tool availability up front; a missing ffmpeg only
    // fails at the first encode otherwise.
    for info in ctx.tools.check_all() {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let app = router::build_router(ctx.clone());

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| vf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| vf_core::Error::Internal(format!("Server error: {e}")))?;

    // Stop continuous workers and other background jobs.
    ctx.jobs.cancel_all();

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
