//! Container runtime seam
//!
//! The bridges only ever talk to the engine through [`RuntimeClient`], so the
//! Docker implementation can be swapped for an in-memory fake in tests.

mod docker;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::io::AsyncWrite;

pub use docker::{connect, DockerRuntime};

/// Output half of an attached exec session
pub type ExecOutput = Pin<Box<dyn Stream<Item = Result<Bytes, RuntimeError>> + Send>>;

/// Input half of an attached exec session
pub type ExecInput = Pin<Box<dyn AsyncWrite + Send>>;

/// Line-delimited JSON stats feed as raw bytes
pub type StatsByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Errors reported by the container engine
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container is not running: {0}")]
    ContainerNotRunning(String),

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Exec session is detached")]
    Detached,

    #[error("Container engine error: {0}")]
    Engine(String),
}

/// Parameters for creating an exec instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub cmd: Vec<String>,
    pub detach_keys: Option<String>,
}

impl ExecOptions {
    /// Fully attached interactive tty running `cmd`
    pub fn interactive(cmd: Vec<String>) -> Self {
        Self {
            attach_stdin: true,
            attach_stdout: true,
            attach_stderr: true,
            tty: true,
            cmd,
            detach_keys: None,
        }
    }

    pub fn with_detach_keys(mut self, keys: Option<String>) -> Self {
        self.detach_keys = keys;
        self
    }
}

/// Duplex byte stream of an attached exec
pub struct ExecStream {
    pub output: ExecOutput,
    pub input: ExecInput,
}

impl std::fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecStream").finish_non_exhaustive()
    }
}

/// Control and data API of the container engine used by the session bridge
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Create an exec instance inside a running container, returning its id
    async fn create_exec(
        &self,
        container_id: &str,
        options: ExecOptions,
    ) -> Result<String, RuntimeError>;

    /// Start the exec and attach to its input and output
    async fn attach_exec(&self, exec_id: &str) -> Result<ExecStream, RuntimeError>;

    /// Resize the pseudo-terminal of a running exec
    async fn resize_exec(&self, exec_id: &str, rows: u16, cols: u16) -> Result<(), RuntimeError>;

    /// Open a stats feed for a container
    ///
    /// With `stream` set, the engine keeps emitting one JSON document per line
    /// until the container stops or the stream is dropped.
    async fn stream_stats(
        &self,
        container_id: &str,
        stream: bool,
    ) -> Result<StatsByteStream, RuntimeError>;
}
