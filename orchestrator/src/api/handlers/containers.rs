//! Container handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use bollard::models::ContainerInspectResponse;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::api::ApiError;
use crate::models::{
    ActionResponse, ContainerView, DashboardSummary, ImageRequest, PruneResponse,
    RecreateResponse, StatsSummary,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_follow")]
    pub follow: bool,
    #[serde(default = "default_tail")]
    pub tail: String,
}

fn default_follow() -> bool {
    true
}

fn default_tail() -> String {
    "100".to_string()
}

/// List containers, running only unless `all=true`
pub async fn list_containers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ContainerView>>, ApiError> {
    Ok(Json(state.host.list_containers(query.all).await?))
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSummary>, ApiError> {
    Ok(Json(state.host.dashboard().await?))
}

pub async fn inspect_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContainerInspectResponse>, ApiError> {
    Ok(Json(state.host.inspect_container(&id).await?))
}

pub async fn start_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.start_container(&id).await?;
    Ok(Json(ActionResponse::new("started", id)))
}

pub async fn stop_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.stop_container(&id).await?;
    Ok(Json(ActionResponse::new("stopped", id)))
}

pub async fn restart_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.restart_container(&id).await?;
    Ok(Json(ActionResponse::new("restarted", id)))
}

pub async fn remove_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.remove_container(&id, query.force).await?;
    Ok(Json(ActionResponse::new("removed", id)))
}

/// Delete all stopped containers
pub async fn prune_containers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PruneResponse>, ApiError> {
    Ok(Json(state.host.prune_containers().await?))
}

/// Create and start a new container from an image
pub async fn recreate_container(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageRequest>,
) -> Result<Json<RecreateResponse>, ApiError> {
    Ok(Json(state.host.recreate_from_image(&request.image).await?))
}

/// One-shot CPU and memory usage
pub async fn container_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatsSummary>, ApiError> {
    // Resolve the container first so unknown ids map to 404
    state.host.inspect_container(&id).await?;
    Ok(Json(state.stats.snapshot(&id).await?))
}

/// Stream log lines as server-sent events
pub async fn container_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    state.host.inspect_container(&id).await?;

    let container_id = id.clone();
    let events = state
        .host
        .log_lines(&id, query.follow, &query.tail)
        .map(move |line| {
            let event = match line {
                Ok(line) => Event::default().data(line),
                Err(e) => {
                    debug!(container_id = %container_id, error = %e, "Log stream failed");
                    Event::default().event("error").data(e.to_string())
                }
            };
            Ok(event)
        });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
