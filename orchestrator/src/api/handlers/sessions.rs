//! Terminal session handlers

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::models::SessionListResponse;
use crate::AppState;

/// List active terminal sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionListResponse> {
    let sessions = state.sessions.list();
    let total = sessions.len();
    Json(SessionListResponse { sessions, total })
}
