//! DockDeck orchestrator library
//!
//! Manages a container host and bridges interactive container shells and live
//! stats to WebSocket clients.

use std::sync::Arc;

use bollard::Docker;

pub mod api;
pub mod bridge;
pub mod compose;
pub mod config;
pub mod gateway;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod runtime;

use bridge::{SessionRegistry, StatsBridge, TerminalBridge};
use runtime::{DockerRuntime, RuntimeClient};

/// Application state shared across all handlers
pub struct AppState {
    pub config: config::AppConfig,
    pub host: host::DockerHost,
    pub compose: compose::ComposeRunner,
    pub sessions: Arc<SessionRegistry>,
    pub terminals: Arc<TerminalBridge>,
    pub stats: Arc<StatsBridge>,
}

impl AppState {
    /// State backed entirely by the given Docker client
    pub fn new(config: config::AppConfig, docker: Docker) -> Self {
        let runtime = Arc::new(DockerRuntime::new(docker.clone()));
        Self::with_runtime(config, docker, runtime)
    }

    /// State whose session bridge runs on `runtime` instead of the engine
    pub fn with_runtime(
        config: config::AppConfig,
        docker: Docker,
        runtime: Arc<dyn RuntimeClient>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        let terminals = Arc::new(TerminalBridge::new(
            Arc::clone(&runtime),
            Arc::clone(&sessions),
            config.terminal.clone(),
        ));
        let stats = Arc::new(StatsBridge::new(runtime));
        let compose = compose::ComposeRunner::new(&config.compose, &config.docker);

        Self {
            host: host::DockerHost::new(docker),
            compose,
            sessions,
            terminals,
            stats,
            config,
        }
    }
}
