//! Configuration module for DockDeck
//!
//! Supports configuration via:
//! - YAML/TOML config files
//! - Environment variables (with DOCKDECK__ prefix)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the JSON log file (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Container engine connection
    #[serde(default)]
    pub docker: DockerConfig,

    /// Interactive terminal settings
    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Compose integration settings
    #[serde(default)]
    pub compose: ComposeConfig,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Container engine connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Engine address (`unix:///var/run/docker.sock`, `tcp://host:2375`);
    /// platform default when unset
    #[serde(default)]
    pub socket: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_docker_timeout")]
    pub timeout_secs: u64,

    /// Path to the docker CLI used for compose (looked up in PATH when unset)
    #[serde(default)]
    pub docker_binary: Option<PathBuf>,
}

/// Interactive terminal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Shells probed in order inside the container; `sh` is the final fallback
    #[serde(default = "default_shells")]
    pub shells: Vec<String>,

    /// Capacity of the per-connection outbound message queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Detach key sequence passed to the engine
    #[serde(default)]
    pub detach_keys: Option<String>,
}

/// Compose integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Directory where uploaded compose files are staged
    #[serde(default = "default_compose_dir")]
    pub work_dir: PathBuf,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_docker_timeout() -> u64 {
    120
}

fn default_shells() -> Vec<String> {
    vec!["bash".to_string(), "sh".to_string()]
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_compose_dir() -> PathBuf {
    std::env::temp_dir().join("dockdeck-compose")
}

fn default_true() -> bool {
    true
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: None,
            timeout_secs: default_docker_timeout(),
            docker_binary: None,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shells: default_shells(),
            outbound_buffer: default_outbound_buffer(),
            detach_keys: None,
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            work_dir: default_compose_dir(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: None,
            docker: DockerConfig::default(),
            terminal: TerminalConfig::default(),
            compose: ComposeConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config/dockdeck").required(false))
            .add_source(config::File::with_name("/etc/dockdeck/config").required(false))
            .add_source(
                config::Environment::with_prefix("DOCKDECK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.docker.timeout_secs == 0 {
            anyhow::bail!("Docker timeout cannot be 0");
        }

        if self.terminal.outbound_buffer == 0 {
            anyhow::bail!("Terminal outbound buffer cannot be 0");
        }

        if self.terminal.shells.is_empty() {
            anyhow::bail!("At least one terminal shell must be configured");
        }

        // Shell names end up inside a `sh -c` probe script
        for shell in &self.terminal.shells {
            if !is_safe_shell_name(shell) {
                anyhow::bail!("Invalid terminal shell name: {:?}", shell);
            }
        }

        Ok(())
    }
}

fn is_safe_shell_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.terminal.shells, vec!["bash", "sh"]);
        assert_eq!(config.terminal.outbound_buffer, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = AppConfig {
            port: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unsafe_shell() {
        let mut config = AppConfig::default();
        config.terminal.shells = vec!["bash; rm -rf /".to_string()];
        assert!(config.validate().is_err());

        config.terminal.shells = vec!["/usr/bin/zsh".to_string()];
        assert!(config.validate().is_ok());
    }
}
