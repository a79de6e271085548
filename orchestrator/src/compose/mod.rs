//! Compose integration via the docker CLI
//!
//! Uploaded documents are staged in the configured work directory and handed
//! to `docker compose`. Arguments are passed directly, never through a shell.

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{ComposeConfig, DockerConfig};
use crate::models::ComposeResponse;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Invalid compose document: {0}")]
    InvalidDocument(String),

    #[error("Failed to stage compose file: {0}")]
    Staging(#[from] std::io::Error),

    #[error("Failed to run docker compose: {0}")]
    Spawn(String),
}

/// Service names declared under `services`, in document order
///
/// A document without a `services` mapping has no services.
pub fn parse_services(yaml: &str) -> Result<Vec<String>, ComposeError> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| ComposeError::InvalidDocument(e.to_string()))?;

    let Some(services) = document.get("services").and_then(|s| s.as_mapping()) else {
        return Ok(Vec::new());
    };

    Ok(services
        .keys()
        .filter_map(|key| match key {
            serde_yaml::Value::String(name) => Some(name.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect())
}

/// Runs `docker compose up` and `down` for submitted documents
#[derive(Debug, Clone)]
pub struct ComposeRunner {
    docker_binary: PathBuf,
    work_dir: PathBuf,
}

impl ComposeRunner {
    pub fn new(compose: &ComposeConfig, docker: &DockerConfig) -> Self {
        let docker_binary = docker.docker_binary.clone().unwrap_or_else(|| {
            which::which("docker").unwrap_or_else(|_| PathBuf::from("docker"))
        });

        Self {
            docker_binary,
            work_dir: compose.work_dir.clone(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `docker compose -f <file> up -d`
    pub async fn up(&self, yaml: &str) -> Result<ComposeResponse, ComposeError> {
        self.run(yaml, &["up", "-d"]).await
    }

    /// `docker compose -f <file> down`
    pub async fn down(&self, yaml: &str) -> Result<ComposeResponse, ComposeError> {
        self.run(yaml, &["down"]).await
    }

    async fn run(&self, yaml: &str, action: &[&str]) -> Result<ComposeResponse, ComposeError> {
        // reject garbage before touching the filesystem
        parse_services(yaml)?;

        std::fs::create_dir_all(&self.work_dir)?;
        let mut staged = tempfile::Builder::new()
            .prefix("compose-")
            .suffix(".yml")
            .tempfile_in(&self.work_dir)?;
        staged.write_all(yaml.as_bytes())?;
        staged.flush()?;

        let output = Command::new(&self.docker_binary)
            .arg("compose")
            .arg("-f")
            .arg(staged.path())
            .args(action)
            .output()
            .await
            .map_err(|e| ComposeError::Spawn(format!("{}: {}", self.docker_binary.display(), e)))?;

        let response = ComposeResponse {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if response.success {
            info!(action = ?action, file = %staged.path().display(), "Compose command finished");
        } else {
            warn!(
                action = ?action,
                exit_code = ?response.exit_code,
                stderr = %response.stderr.trim(),
                "Compose command failed"
            );
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = r#"
version: "3.8"
services:
  web:
    image: nginx
  db:
    image: postgres
  cache:
    image: redis
"#;

    fn runner(binary: &str, work_dir: &Path) -> ComposeRunner {
        ComposeRunner::new(
            &ComposeConfig {
                work_dir: work_dir.to_path_buf(),
            },
            &DockerConfig {
                docker_binary: Some(PathBuf::from(binary)),
                ..DockerConfig::default()
            },
        )
    }

    #[test]
    fn test_parse_services_in_order() {
        assert_eq!(parse_services(DOCUMENT).unwrap(), vec!["web", "db", "cache"]);
    }

    #[test]
    fn test_parse_without_services() {
        assert!(parse_services("version: '3'\n").unwrap().is_empty());
        assert!(parse_services("services: []\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse_services("services: [web\n").unwrap_err();
        assert!(matches!(err, ComposeError::InvalidDocument(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_up_passes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("echo", dir.path());

        let response = runner.up(DOCUMENT).await.unwrap();
        assert!(response.success);
        assert!(response.stdout.starts_with("compose -f "));
        assert!(response.stdout.contains(dir.path().to_str().unwrap()));
        assert!(response.stdout.trim_end().ends_with("up -d"));

        // staged file is removed once the command returns
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_document_is_not_staged() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("echo", &dir.path().join("staging"));

        let err = runner.down("services: [web\n").await.unwrap_err();
        assert!(matches!(err, ComposeError::InvalidDocument(_)));
        assert!(!runner.work_dir().exists());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("/nonexistent/docker", dir.path());

        let err = runner.up(DOCUMENT).await.unwrap_err();
        assert!(matches!(err, ComposeError::Spawn(_)));
    }
}
