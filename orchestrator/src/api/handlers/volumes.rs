//! Volume handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::ApiError;
use crate::models::{ActionResponse, PruneResponse, VolumeView};
use crate::AppState;

pub async fn list_volumes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VolumeView>>, ApiError> {
    Ok(Json(state.host.list_volumes().await?))
}

pub async fn remove_volume(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.remove_volume(&name).await?;
    Ok(Json(ActionResponse::new("removed", name)))
}

pub async fn prune_volumes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PruneResponse>, ApiError> {
    Ok(Json(state.host.prune_volumes().await?))
}
