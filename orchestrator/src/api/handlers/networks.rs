//! Network handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::ApiError;
use crate::models::{ActionResponse, ConnectNetworkRequest, CreateNetworkRequest, NetworkView};
use crate::AppState;

pub async fn list_networks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<NetworkView>>, ApiError> {
    Ok(Json(state.host.list_networks().await?))
}

pub async fn create_network(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNetworkRequest>,
) -> Result<(StatusCode, Json<ActionResponse>), ApiError> {
    state
        .host
        .create_network(&request.name, &request.driver)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ActionResponse::new("created", request.name)),
    ))
}

pub async fn remove_network(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.remove_network(&id).await?;
    Ok(Json(ActionResponse::new("removed", id)))
}

/// Attach a container to a network
pub async fn connect_network(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ConnectNetworkRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.connect_network(&id, &request.container).await?;
    Ok(Json(ActionResponse::new("connected", request.container)))
}
