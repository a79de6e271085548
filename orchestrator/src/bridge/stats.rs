//! Container stats relay and snapshot projection

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::gateway::ServerMessage;
use crate::models::StatsSummary;
use crate::runtime::RuntimeClient;

use super::{forward, BridgeError, OutboundSender};

/// Placeholder for a metric the engine did not report
pub const NOT_AVAILABLE: &str = "N/A";

/// CPU and memory figures from one stats document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatSnapshot {
    /// Cumulative CPU time in nanoseconds
    pub cpu_total_nanos: Option<u64>,
    /// Current memory usage in bytes
    pub memory_usage_bytes: Option<u64>,
}

#[derive(Deserialize)]
struct RawStats {
    #[serde(default)]
    cpu_stats: Option<RawCpuStats>,
    #[serde(default)]
    memory_stats: Option<RawMemoryStats>,
}

#[derive(Deserialize)]
struct RawCpuStats {
    #[serde(default)]
    cpu_usage: Option<RawCpuUsage>,
}

#[derive(Deserialize)]
struct RawCpuUsage {
    #[serde(default)]
    total_usage: Option<u64>,
}

#[derive(Deserialize)]
struct RawMemoryStats {
    #[serde(default)]
    usage: Option<u64>,
}

impl StatSnapshot {
    /// Project a stats JSON line; unrelated fields are ignored
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let raw: RawStats = serde_json::from_str(line)?;

        Ok(Self {
            cpu_total_nanos: raw
                .cpu_stats
                .and_then(|cpu| cpu.cpu_usage)
                .and_then(|usage| usage.total_usage),
            memory_usage_bytes: raw.memory_stats.and_then(|mem| mem.usage),
        })
    }

    /// Whole milliseconds of CPU time, e.g. `"2 ms"`
    pub fn cpu_display(&self) -> String {
        match self.cpu_total_nanos {
            Some(nanos) => format!("{} ms", nanos / 1_000_000),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    /// Memory in MiB with one decimal, e.g. `"10.0 MB"`
    pub fn memory_display(&self) -> String {
        match self.memory_usage_bytes {
            Some(bytes) => format!("{:.1} MB", bytes as f64 / 1024.0 / 1024.0),
            None => NOT_AVAILABLE.to_string(),
        }
    }
}

/// Relays container stats feeds to real-time connections
pub struct StatsBridge {
    runtime: Arc<dyn RuntimeClient>,
}

impl StatsBridge {
    pub fn new(runtime: Arc<dyn RuntimeClient>) -> Self {
        Self { runtime }
    }

    /// Forward every non-blank stats line until cancelled or the feed ends
    ///
    /// Returns the number of lines forwarded. A broken feed is returned as an
    /// error and not retried.
    pub async fn stream(
        &self,
        container_id: &str,
        outbound: &OutboundSender,
        cancel: &CancellationToken,
    ) -> Result<u64, BridgeError> {
        if cancel.is_cancelled() {
            return Ok(0);
        }

        let feed = self.runtime.stream_stats(container_id, true).await?;
        let _active = crate::metrics::StatsStreamGuard::new();
        let mut lines = StreamReader::new(feed).lines();
        let mut forwarded = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                debug!(container_id = %container_id, "Stats stream ended");
                break;
            };

            if line.trim().is_empty() {
                continue;
            }

            if !forward(outbound, cancel, ServerMessage::ReceiveContainerStats { json_line: line }).await
            {
                break;
            }
            forwarded += 1;
        }

        debug!(container_id = %container_id, forwarded, "Stats relay stopped");
        Ok(forwarded)
    }

    /// Read a single stats document and format CPU and memory usage
    pub async fn snapshot(&self, container_id: &str) -> Result<StatsSummary, BridgeError> {
        let feed = self.runtime.stream_stats(container_id, false).await?;
        let mut lines = StreamReader::new(feed).lines();

        let mut snapshot = StatSnapshot::default();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            snapshot = StatSnapshot::parse(&line)
                .map_err(|e| BridgeError::StreamError(format!("Invalid stats document: {}", e)))?;
            break;
        }

        Ok(StatsSummary {
            container_id: container_id.to_string(),
            cpu: snapshot.cpu_display(),
            memory: snapshot.memory_display(),
        })
    }
}
