//! Prometheus metrics export
//!
//! Provides metrics endpoint for monitoring the session bridge

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::warn;

use crate::bridge::BridgeError;
use crate::AppState;

/// Prometheus metrics recorder
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics system
///
/// Installing the global recorder can only succeed once per process; later
/// calls are no-ops.
pub fn init_metrics() -> anyhow::Result<()> {
    METRICS_HANDLE.get_or_try_init(|| -> anyhow::Result<PrometheusHandle> {
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("dockdeck_engine_request_duration_seconds".to_string()),
                &[0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 30.0, 120.0],
            )?
            .install_recorder()
            .map_err(anyhow::Error::from)
    })?;
    Ok(())
}

/// Record the number of registered terminal sessions
pub fn record_terminal_sessions(count: usize) {
    gauge!("dockdeck_terminal_sessions").set(count as f64);
}

/// Record a terminal that failed before it was registered
pub fn record_setup_failure() {
    counter!("dockdeck_terminal_setup_failures_total").increment(1);
}

pub fn record_terminal_input(bytes: usize) {
    counter!("dockdeck_terminal_input_bytes_total").increment(bytes as u64);
}

pub fn record_terminal_output(bytes: usize) {
    counter!("dockdeck_terminal_output_bytes_total").increment(bytes as u64);
}

/// Record a real-time connection opening
pub fn record_connection_opened() {
    counter!("dockdeck_connections_total").increment(1);
    gauge!("dockdeck_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("dockdeck_active_connections").decrement(1.0);
}

/// Record a client message that failed
pub fn record_bridge_error(err: &BridgeError) {
    counter!(
        "dockdeck_bridge_errors_total",
        "code" => err.code(),
        "stage" => err.stage()
    )
    .increment(1);
}

/// Record a REST call to the container engine
pub fn record_engine_request(operation: &'static str, duration_secs: f64, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!("dockdeck_engine_requests_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    histogram!("dockdeck_engine_request_duration_seconds", "operation" => operation)
        .record(duration_secs);
}

/// Tracks a live stats relay for as long as it is held
pub struct StatsStreamGuard(());

impl StatsStreamGuard {
    pub fn new() -> Self {
        gauge!("dockdeck_stats_streams").increment(1.0);
        Self(())
    }
}

impl Default for StatsStreamGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StatsStreamGuard {
    fn drop(&mut self) {
        gauge!("dockdeck_stats_streams").decrement(1.0);
    }
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Refresh gauges that are not updated on every change
    gauge!("dockdeck_terminal_sessions").set(state.sessions.len() as f64);

    let Some(handle) = METRICS_HANDLE.get() else {
        warn!("Metrics requested before the recorder was installed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [("Content-Type", "text/plain; version=0.0.4")],
            String::new(),
        );
    };

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        handle.render(),
    )
}
