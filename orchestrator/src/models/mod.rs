//! Data models for the DockDeck orchestrator
//!
//! This module defines all request/response types shared by the REST API and
//! the session bridge.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Container Models
// ============================================================================

/// Container row as shown in listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerView {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Engine state (`running`, `exited`, ...)
    pub state: String,
    /// Human readable status (`Up 3 minutes`)
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Published ports as `ip:public -> private`
    #[serde(default)]
    pub ports: Vec<String>,
}

/// Aggregate view over every container on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_containers: usize,
    pub running: usize,
    pub exited: usize,
    /// Container count per image
    pub image_usage: BTreeMap<String, usize>,
    pub containers: Vec<ContainerView>,
}

/// CPU and memory usage of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub container_id: String,
    /// Cumulative CPU time, e.g. `"2 ms"`
    pub cpu: String,
    /// Memory usage, e.g. `"10.0 MB"`
    pub memory: String,
}

/// Request naming an image (pull, recreate)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub image: String,
}

/// Container started from an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecreateResponse {
    pub container_id: String,
    pub name: String,
}

/// Result of a prune operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneResponse {
    pub deleted: Vec<String>,
    pub space_reclaimed_bytes: u64,
}

// ============================================================================
// Image, Volume, Network Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageView {
    pub id: String,
    pub tags: Vec<String>,
    pub size_bytes: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeView {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkView {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
}

/// Request to create a network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNetworkRequest {
    pub name: String,
    #[serde(default = "default_network_driver")]
    pub driver: String,
}

fn default_network_driver() -> String {
    "bridge".to_string()
}

/// Request to attach a container to a network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectNetworkRequest {
    pub container: String,
}

// ============================================================================
// Compose Models
// ============================================================================

/// Compose document submitted by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub yaml: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeServicesResponse {
    pub services: Vec<String>,
}

/// Output of a `docker compose` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeResponse {
    pub success: bool,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

// ============================================================================
// Session Models
// ============================================================================

/// Active interactive terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub connection_id: String,
    pub container_id: String,
    pub exec_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

// ============================================================================
// System Models
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: u64,
    #[serde(default)]
    pub docker_version: Option<String>,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Acknowledgement for operations without a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    pub target: String,
}

impl ActionResponse {
    pub fn new(status: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            target: target.into(),
        }
    }
}

// ============================================================================
// Error Models
// ============================================================================

/// Standard error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
