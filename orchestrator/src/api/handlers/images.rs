//! Image handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::ApiError;
use crate::models::{ActionResponse, ImageRequest, ImageView};
use crate::AppState;

use super::containers::RemoveQuery;

pub async fn list_images(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ImageView>>, ApiError> {
    Ok(Json(state.host.list_images().await?))
}

/// Pull an image; `name:tag`, tag defaults to `latest`
pub async fn pull_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.pull_image(&request.image).await?;
    Ok(Json(ActionResponse::new("pulled", request.image)))
}

pub async fn remove_image(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> Result<Json<ActionResponse>, ApiError> {
    state.host.remove_image(&name, query.force).await?;
    Ok(Json(ActionResponse::new("removed", name)))
}
