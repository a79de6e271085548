//! In-memory container runtime for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc as futures_mpsc;
use tokio::io::{AsyncBufReadExt, BufReader};

use dockdeck_orchestrator::runtime::{
    ExecOptions, ExecStream, RuntimeClient, RuntimeError, StatsByteStream,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Fake engine whose containers run a tiny line-oriented echo shell
///
/// `echo X` prints `X`; anything else is reported as an unknown command. The
/// shell exits when its stdin is closed.
#[derive(Default)]
pub struct FakeRuntime {
    containers: HashSet<String>,
    exec_seq: AtomicUsize,
    open_shells: Arc<AtomicUsize>,
    commands: Mutex<Vec<Vec<String>>>,
    stats_feed: Mutex<Option<futures_mpsc::UnboundedReceiver<io::Result<Bytes>>>>,
}

impl FakeRuntime {
    pub fn with_containers(names: &[&str]) -> Self {
        Self {
            containers: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Shells whose stdin has not been closed yet
    pub fn open_shells(&self) -> usize {
        self.open_shells.load(Ordering::SeqCst)
    }

    /// Commands passed to `create_exec`, in call order
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    /// Hand-fed stats stream returned by the next `stream_stats` call
    pub fn stats_feed(&self) -> futures_mpsc::UnboundedSender<io::Result<Bytes>> {
        let (tx, rx) = futures_mpsc::unbounded();
        *self.stats_feed.lock().unwrap() = Some(rx);
        tx
    }

    /// Wait until the number of open shells reaches `expected`
    pub async fn wait_for_open_shells(&self, expected: usize) -> bool {
        wait_until(|| self.open_shells() == expected).await
    }
}

/// Poll `condition` until it holds or the test timeout passes
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn create_exec(
        &self,
        container_id: &str,
        options: ExecOptions,
    ) -> Result<String, RuntimeError> {
        if !self.containers.contains(container_id) {
            return Err(RuntimeError::ContainerNotFound(format!(
                "{}: No such container",
                container_id
            )));
        }
        self.commands.lock().unwrap().push(options.cmd);

        let seq = self.exec_seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("exec-{}", seq))
    }

    async fn attach_exec(&self, _exec_id: &str) -> Result<ExecStream, RuntimeError> {
        let (client, shell_side) = tokio::io::duplex(4096);
        let (output_tx, output_rx) = futures_mpsc::unbounded::<Result<Bytes, RuntimeError>>();
        let open = Arc::clone(&self.open_shells);
        open.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let _ = output_tx.unbounded_send(Ok(Bytes::from_static(b"$ ")));
            let mut lines = BufReader::new(shell_side).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match line.strip_prefix("echo ") {
                    Some(text) => format!("{}\r\n$ ", text),
                    None => format!("sh: {}: not found\r\n$ ", line.trim()),
                };
                if output_tx.unbounded_send(Ok(Bytes::from(reply))).is_err() {
                    break;
                }
            }

            open.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(ExecStream {
            output: Box::pin(output_rx),
            input: Box::pin(client),
        })
    }

    async fn resize_exec(&self, _exec_id: &str, _rows: u16, _cols: u16) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn stream_stats(
        &self,
        container_id: &str,
        _stream: bool,
    ) -> Result<StatsByteStream, RuntimeError> {
        if !self.containers.contains(container_id) {
            return Err(RuntimeError::ContainerNotFound(container_id.to_string()));
        }

        if let Some(feed) = self.stats_feed.lock().unwrap().take() {
            return Ok(Box::pin(feed));
        }

        let canned: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(
            b"{\"cpu_stats\":{\"cpu_usage\":{\"total_usage\":2000000}},\"memory_stats\":{\"usage\":10485760}}\n",
        ))];
        Ok(Box::pin(futures::stream::iter(canned)))
    }
}
