//! HTTP surface over the image service.

mod routes;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::service::{ImageService, Origin};

pub use routes::status_for;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImageService>,
    /// Used for image addresses when a request carries no usable `Host` header.
    pub fallback_origin: Origin,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let static_route = format!(
        "/{}/images/{{filename}}",
        state.service.store().static_url().trim_matches('/')
    );

    Router::new()
        .route("/image", get(routes::list_images).post(routes::create_image))
        .route(
            "/image/{id}",
            get(routes::paint_image)
                .put(routes::update_image)
                .delete(routes::delete_image),
        )
        .route(&static_route, get(routes::serve_static))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: &ServerConfig, service: Arc<ImageService>) -> Result<()> {
    let state = AppState {
        service,
        fallback_origin: Origin {
            host: config.host.clone(),
            port: config.port,
        },
    };
    let app = router(state, config.max_upload_bytes);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
