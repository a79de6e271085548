//! Real-time WebSocket gateway
//!
//! Each socket gets a [`Connection`] that routes client messages to the
//! terminal and stats bridges. Outbound messages go through a bounded queue
//! drained by a dedicated writer task.

mod messages;

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bridge::{forward, BridgeError, OutboundSender, StatsBridge, TerminalBridge};
use crate::AppState;

pub use messages::{ClientMessage, ServerMessage};

/// Per-socket state and message routing
pub struct Connection {
    id: String,
    cancel: CancellationToken,
    outbound: OutboundSender,
    terminals: Arc<TerminalBridge>,
    stats: Arc<StatsBridge>,
    stats_tasks: JoinSet<()>,
    disconnected: bool,
}

impl Connection {
    pub fn new(
        terminals: Arc<TerminalBridge>,
        stats: Arc<StatsBridge>,
        outbound: OutboundSender,
    ) -> Self {
        crate::metrics::record_connection_opened();
        Self {
            id: Uuid::new_v4().to_string(),
            cancel: CancellationToken::new(),
            outbound,
            terminals,
            stats,
            stats_tasks: JoinSet::new(),
            disconnected: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token cancelled when the connection goes away
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of stats relays still running
    pub fn active_stats(&mut self) -> usize {
        while self.stats_tasks.try_join_next().is_some() {}
        self.stats_tasks.len()
    }

    /// Parse and route a JSON text frame
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                debug!(connection_id = %self.id, error = %e, "Unparseable client frame");
                self.notify(ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                })
                .await;
            }
        }
    }

    pub async fn dispatch(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::JoinTerminal { container_id } => self.join_terminal(&container_id).await,
            ClientMessage::SendInputToTerminal { text } => self.send_input(text.as_bytes()).await,
            ClientMessage::ResizeTerminal { rows, cols } => {
                if let Err(e) = self.terminals.resize(&self.id, rows, cols).await {
                    self.report_terminal_error(e).await;
                }
            }
            ClientMessage::CloseTerminal => {
                self.terminals.teardown(&self.id);
            }
            ClientMessage::StreamStats { container_id } => self.start_stats(container_id),
        }
    }

    async fn join_terminal(&mut self, container_id: &str) {
        let joined = self
            .terminals
            .join(&self.id, container_id, self.outbound.clone(), &self.cancel)
            .await;

        match joined {
            Ok(session) => {
                self.notify(ServerMessage::TerminalJoined {
                    exec_id: session.exec_id.clone(),
                })
                .await;
            }
            Err(e) => {
                warn!(
                    connection_id = %self.id,
                    container_id = %container_id,
                    setup = e.is_setup_failure(),
                    error = %e,
                    "Terminal join failed"
                );
                self.report_terminal_error(e).await;
            }
        }
    }

    /// Write raw keystrokes to this connection's terminal
    pub async fn send_input(&mut self, data: &[u8]) {
        if let Err(e) = self.terminals.send_input(&self.id, data).await {
            self.report_terminal_error(e).await;
        }
    }

    async fn report_terminal_error(&self, err: BridgeError) {
        crate::metrics::record_bridge_error(&err);
        self.notify(ServerMessage::TerminalError {
            message: err.to_string(),
        })
        .await;
    }

    /// Start a supervised stats relay for `container_id`
    ///
    /// Several relays may run at once; all of them stop on disconnect.
    pub fn start_stats(&mut self, container_id: String) {
        // reap relays that already ended
        while self.stats_tasks.try_join_next().is_some() {}

        let stats = Arc::clone(&self.stats);
        let outbound = self.outbound.clone();
        let cancel = self.cancel.child_token();
        let connection_id = self.id.clone();

        self.stats_tasks.spawn(async move {
            match stats.stream(&container_id, &outbound, &cancel).await {
                Ok(forwarded) => {
                    debug!(
                        connection_id = %connection_id,
                        container_id = %container_id,
                        forwarded,
                        "Stats relay finished"
                    );
                }
                Err(e) => {
                    warn!(
                        connection_id = %connection_id,
                        container_id = %container_id,
                        error = %e,
                        "Stats relay failed"
                    );
                    crate::metrics::record_bridge_error(&e);
                    forward(
                        &outbound,
                        &cancel,
                        ServerMessage::StatsError {
                            message: format!("Stats stream error: {}", e),
                        },
                    )
                    .await;
                }
            }
        });
    }

    /// Queue a message for the client, dropping it if the connection is gone
    pub async fn notify(&self, message: ServerMessage) {
        forward(&self.outbound, &self.cancel, message).await;
    }

    /// Release everything the connection holds
    ///
    /// Returns `false` when cleanup already ran.
    pub fn on_disconnected(&mut self) -> bool {
        if self.disconnected {
            return false;
        }
        self.disconnected = true;

        self.cancel.cancel();
        let had_terminal = self.terminals.teardown(&self.id);
        self.stats_tasks.abort_all();
        crate::metrics::record_connection_closed();

        info!(
            connection_id = %self.id,
            had_terminal,
            "Connection closed"
        );
        true
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.on_disconnected();
    }
}

/// Handle WebSocket upgrade
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket connection until either side goes away
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut queue) = mpsc::channel::<ServerMessage>(state.config.terminal.outbound_buffer);

    let mut connection = Connection::new(
        Arc::clone(&state.terminals),
        Arc::clone(&state.stats),
        outbound,
    );
    let connection_id = connection.id().to_string();

    info!(connection_id = %connection_id, "WebSocket connection established");

    let writer_id = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!(connection_id = %writer_id, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => connection.handle_text(&text).await,
                Some(Ok(Message::Binary(data))) => connection.send_input(&data).await,
                Some(Ok(Message::Close(_))) | None => break,
                // ping and pong are answered by axum
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(connection_id = %connection_id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
            _ = &mut writer => {
                debug!(connection_id = %connection_id, "WebSocket writer stopped");
                break;
            }
        }
    }

    connection.on_disconnected();
    writer.abort();
}
