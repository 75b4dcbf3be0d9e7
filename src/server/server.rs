use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::api::{self, AppState};
use crate::config::DashbundleConfig;
use crate::render::{NbconvertRenderer, Renderer};

/// Build the application router, mounted under `base_url`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let base_url = state.base_url.trim_end_matches('/').to_string();
    let routes = api::api_router().with_state(state);

    if base_url.is_empty() {
        routes
    } else {
        Router::new().nest(&base_url, routes)
    }
}

/// Start the bundler server and run until Ctrl+C.
pub async fn start_server(config: DashbundleConfig) -> Result<()> {
    std::fs::create_dir_all(&config.tmp_dir).with_context(|| {
        format!(
            "Failed to create bundle directory {}",
            config.tmp_dir.display()
        )
    })?;

    let renderer: Arc<dyn Renderer> = Arc::new(NbconvertRenderer::new(&config.renderer));
    let state = Arc::new(AppState::new(&config, renderer));

    let mut app = build_router(state);
    if config.dev {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        base_url = %config.base_url,
        notebook_dir = %config.notebook_dir.display(),
        tmp_dir = %config.tmp_dir.display(),
        git_backend = %config.git.backend.display(),
        "dashbundle listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
