//! HTTP Gateway
//!
//! ```text
//! GET  /health                  public
//! GET  /api-docs/openapi.json   public
//! POST /api/v1/transfer         bearer
//! GET  /api/v1/accounts/{id}    bearer, caller == id
//! GET  /api/v1/transfers/{id}   bearer, caller started the transfer
//! ```

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use anyhow::Context;
use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use utoipa::OpenApi;

use crate::config::GatewayConfig;
pub use state::AppState;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}

/// Build the complete router
pub fn router(state: Arc<AppState>) -> Router {
    let private_routes = Router::new()
        .route("/transfer", post(handlers::create_transfer))
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/transfers/{id}", get(handlers::get_transfer))
        .layer(from_fn_with_state(state.clone(), handlers::auth_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1", private_routes)
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, version = state.version, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
