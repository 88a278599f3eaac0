//! Minimal HTTP status surface: liveness probe plus a read-only team status
//! endpoint. The coordination fabric's real work happens over the MCP
//! transport in `coord-mcp`/`coord-agent`; this crate exists only so an
//! operator (or an orchestrating process) can poll team health over HTTP
//! without speaking MCP.

pub mod error;

use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    routing::get,
};
use coord_core::store::Store;
use error::{Result, ServerError};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    start_time: Instant,
}

pub fn router(store: Arc<Store>) -> Router {
    let state = AppState {
        store,
        start_time: Instant::now(),
    };

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/teams/{name}/status", get(team_status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct HealthzResponse {
    status: &'static str,
    uptime_seconds: u64,
}

async fn healthz_handler(State(state): State<AppState>) -> Json<HealthzResponse> {
    Json(HealthzResponse {
        status: "ok",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

async fn team_status_handler(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> Result<Json<serde_json::Value>> {
    let report = coord_core::report::build_team_report(&state.store, &name)
        .await
        .map_err(ServerError::Store)?
        .ok_or_else(|| ServerError::NotFound(format!("team \"{name}\" not found")))?;

    Ok(Json(report.to_json()))
}

/// Serve the status router on the given address until ctrl-c or SIGTERM.
pub async fn serve(store: Arc<Store>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let app = router(store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "coord-http listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
