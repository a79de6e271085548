//! API module for the DockDeck orchestrator
//!
//! Provides REST API endpoints for:
//! - Container lifecycle, logs and stats
//! - Images, volumes and networks
//! - Compose documents
//! - Active terminal sessions
//! - Health checks
//!
//! and the WebSocket endpoint for terminals and live stats.

mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::gateway::websocket_handler;
use crate::AppState;

pub use error::ApiError;
pub use handlers::health::start_clock;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health::health_check))
        // Real-time endpoint; `/dockerhub` kept as an alias
        .route("/ws", get(websocket_handler))
        .route("/dockerhub", get(websocket_handler))
        .nest("/api/v1", api_v1_routes());

    if state.config.metrics.enabled {
        router = router.route("/metrics", get(crate::metrics::metrics_handler));
    }

    router.with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/dashboard", get(handlers::containers::dashboard))
        // Container endpoints
        .route("/containers", get(handlers::containers::list_containers))
        .route("/containers/prune", post(handlers::containers::prune_containers))
        .route("/containers/recreate", post(handlers::containers::recreate_container))
        .route(
            "/containers/:id",
            get(handlers::containers::inspect_container)
                .delete(handlers::containers::remove_container),
        )
        .route("/containers/:id/start", post(handlers::containers::start_container))
        .route("/containers/:id/stop", post(handlers::containers::stop_container))
        .route("/containers/:id/restart", post(handlers::containers::restart_container))
        .route("/containers/:id/stats", get(handlers::containers::container_stats))
        .route("/containers/:id/logs", get(handlers::containers::container_logs))
        // Image endpoints
        .route("/images", get(handlers::images::list_images))
        .route("/images/pull", post(handlers::images::pull_image))
        .route("/images/:name", delete(handlers::images::remove_image))
        // Volume endpoints
        .route("/volumes", get(handlers::volumes::list_volumes))
        .route("/volumes/prune", post(handlers::volumes::prune_volumes))
        .route("/volumes/:name", delete(handlers::volumes::remove_volume))
        // Network endpoints
        .route(
            "/networks",
            get(handlers::networks::list_networks).post(handlers::networks::create_network),
        )
        .route("/networks/:id", delete(handlers::networks::remove_network))
        .route("/networks/:id/connect", post(handlers::networks::connect_network))
        // Compose endpoints
        .route("/compose/services", post(handlers::compose::list_services))
        .route("/compose/up", post(handlers::compose::compose_up))
        .route("/compose/down", post(handlers::compose::compose_down))
        // Terminal sessions
        .route("/sessions", get(handlers::sessions::list_sessions))
}
