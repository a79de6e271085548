//! Session bridge between container exec streams and real-time connections
//!
//! - `TerminalBridge` relays an interactive shell in both directions
//! - `StatsBridge` relays the live stats feed of a container
//! - `SessionRegistry` tracks the one terminal each connection may hold

mod decode;
mod error;
mod registry;
mod session;
mod stats;
mod terminal;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::gateway::ServerMessage;

pub use decode::Utf8Decoder;
pub use error::BridgeError;
pub use registry::SessionRegistry;
pub use session::Session;
pub use stats::{StatSnapshot, StatsBridge, NOT_AVAILABLE};
pub use terminal::{shell_command, TerminalBridge};

/// Bounded queue feeding a connection's writer task
pub type OutboundSender = mpsc::Sender<ServerMessage>;

/// Queue a message for the client
///
/// Waits while the queue is full. Returns `false` when the connection was
/// cancelled or its writer is gone, in which case the caller should stop.
pub(crate) async fn forward(
    outbound: &OutboundSender,
    cancel: &CancellationToken,
    message: ServerMessage,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = outbound.send(message) => sent.is_ok(),
    }
}
