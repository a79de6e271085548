//! DockDeck orchestrator - container host manager
//!
//! This is the main entry point for the DockDeck orchestrator service.
//! It talks to the Docker engine and serves the REST API and the WebSocket
//! terminal and stats bridge.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use dockdeck_orchestrator::api::{create_router, start_clock};
use dockdeck_orchestrator::config::AppConfig;
use dockdeck_orchestrator::logging::init_logging;
use dockdeck_orchestrator::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level, config.log_dir.as_deref())?;
    start_clock();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting DockDeck orchestrator"
    );

    if config.metrics.enabled {
        dockdeck_orchestrator::metrics::init_metrics()?;
        info!("Prometheus metrics initialized");
    }

    let docker = dockdeck_orchestrator::runtime::connect(&config.docker)?;
    match docker.version().await {
        Ok(version) => info!(
            docker_version = ?version.version,
            api_version = ?version.api_version,
            "Connected to Docker engine"
        ),
        // Keep serving; health reports degraded until the engine is back
        Err(e) => warn!(error = %e, "Docker engine not reachable"),
    }

    let state = Arc::new(AppState::new(config.clone(), docker));

    // Build the router with all routes and middleware
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid listen address")?;
    info!(%addr, "Listening on");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");

    let remaining = state.sessions.len();
    if remaining > 0 {
        warn!(sessions = remaining, "Terminal sessions still open at shutdown");
    }

    info!("DockDeck orchestrator stopped");
    Ok(())
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
