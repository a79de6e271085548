//! Compose handlers

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::api::ApiError;
use crate::compose::parse_services;
use crate::models::{ComposeRequest, ComposeResponse, ComposeServicesResponse};
use crate::AppState;

/// List the services a compose document declares
pub async fn list_services(
    Json(request): Json<ComposeRequest>,
) -> Result<Json<ComposeServicesResponse>, ApiError> {
    let services = parse_services(&request.yaml)?;
    Ok(Json(ComposeServicesResponse { services }))
}

pub async fn compose_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComposeRequest>,
) -> Result<Json<ComposeResponse>, ApiError> {
    Ok(Json(state.compose.up(&request.yaml).await?))
}

pub async fn compose_down(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComposeRequest>,
) -> Result<Json<ComposeResponse>, ApiError> {
    Ok(Json(state.compose.down(&request.yaml).await?))
}
