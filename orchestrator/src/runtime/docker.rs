//! Docker engine implementation of the runtime seam

use std::io;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{LogOutput, StatsOptions};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::DockerConfig;

use super::{ExecOptions, ExecStream, RuntimeClient, RuntimeError, StatsByteStream};

/// Connect to the engine described by the configuration
///
/// `unix://` paths and bare paths use the local socket, `tcp://` and `http://`
/// addresses go over HTTP, anything else falls back to the platform default.
pub fn connect(config: &DockerConfig) -> Result<Docker> {
    let timeout = config.timeout_secs;

    let docker = match config.socket.as_deref() {
        Some(addr) if addr.starts_with("tcp://") || addr.starts_with("http://") => {
            Docker::connect_with_http(addr, timeout, bollard::API_DEFAULT_VERSION)
                .with_context(|| format!("Failed to connect to Docker at {}", addr))?
        }
        Some(addr) => {
            let path = addr.trim_start_matches("unix://");
            Docker::connect_with_unix(path, timeout, bollard::API_DEFAULT_VERSION)
                .with_context(|| format!("Failed to connect to Docker socket {}", path))?
        }
        None => Docker::connect_with_local_defaults()
            .context("Failed to connect to the local Docker engine")?,
    };

    info!(socket = ?config.socket, timeout_secs = timeout, "Docker client configured");
    Ok(docker)
}

/// Map an engine failure onto the runtime taxonomy
pub(crate) fn classify(err: DockerError, target: &str) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::ContainerNotFound(format!("{}: {}", target, message)),
        DockerError::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::ContainerNotRunning(format!("{}: {}", target, message)),
        DockerError::IOError { .. }
        | DockerError::HyperResponseError { .. }
        | DockerError::RequestTimeoutError => RuntimeError::EngineUnavailable(err.to_string()),
        other => RuntimeError::Engine(other.to_string()),
    }
}

/// Encode one stats document as a single newline-terminated JSON line
fn encode_line<T: serde::Serialize>(document: &T) -> io::Result<Bytes> {
    let mut line = serde_json::to_vec(document)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Runtime client backed by the Docker engine API
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn create_exec(
        &self,
        container_id: &str,
        options: ExecOptions,
    ) -> Result<String, RuntimeError> {
        let config = CreateExecOptions {
            attach_stdin: Some(options.attach_stdin),
            attach_stdout: Some(options.attach_stdout),
            attach_stderr: Some(options.attach_stderr),
            tty: Some(options.tty),
            cmd: Some(options.cmd),
            detach_keys: options.detach_keys,
            ..Default::default()
        };

        let created = self
            .docker
            .create_exec(container_id, config)
            .await
            .map_err(|e| classify(e, container_id))?;

        debug!(container_id = %container_id, exec_id = %created.id, "Exec created");
        Ok(created.id)
    }

    async fn attach_exec(&self, exec_id: &str) -> Result<ExecStream, RuntimeError> {
        let options = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let started = self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(|e| classify(e, exec_id))?;

        match started {
            StartExecResults::Attached { output, input } => {
                let output = output.map(|frame| {
                    frame
                        .map(LogOutput::into_bytes)
                        .map_err(|e| RuntimeError::Engine(e.to_string()))
                });
                Ok(ExecStream {
                    output: Box::pin(output),
                    input,
                })
            }
            StartExecResults::Detached => Err(RuntimeError::Detached),
        }
    }

    async fn resize_exec(&self, exec_id: &str, rows: u16, cols: u16) -> Result<(), RuntimeError> {
        self.docker
            .resize_exec(
                exec_id,
                ResizeExecOptions {
                    height: rows,
                    width: cols,
                },
            )
            .await
            .map_err(|e| classify(e, exec_id))
    }

    async fn stream_stats(
        &self,
        container_id: &str,
        stream: bool,
    ) -> Result<StatsByteStream, RuntimeError> {
        let options = StatsOptions {
            stream,
            one_shot: false,
        };

        // bollard only hands out decoded documents; fields it does not model are lost
        let feed = self.docker.stats(container_id, Some(options)).map(|item| -> io::Result<Bytes> {
            let stats = item.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            encode_line(&stats)
        });

        Ok(Box::pin(feed))
    }
}
