//! Connection routing and the WebSocket endpoint end to end

mod common;

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use dockdeck_orchestrator::api::create_router;
use dockdeck_orchestrator::bridge::{SessionRegistry, StatsBridge, TerminalBridge};
use dockdeck_orchestrator::config::{AppConfig, TerminalConfig};
use dockdeck_orchestrator::gateway::{ClientMessage, Connection, ServerMessage};
use dockdeck_orchestrator::AppState;

use common::{wait_until, FakeRuntime, TIMEOUT};

struct Harness {
    runtime: Arc<FakeRuntime>,
    registry: Arc<SessionRegistry>,
    connection: Connection,
    rx: mpsc::Receiver<ServerMessage>,
}

fn harness(containers: &[&str]) -> Harness {
    let runtime = Arc::new(FakeRuntime::with_containers(containers));
    let registry = Arc::new(SessionRegistry::new());
    let terminals = Arc::new(TerminalBridge::new(
        runtime.clone(),
        Arc::clone(&registry),
        TerminalConfig::default(),
    ));
    let stats = Arc::new(StatsBridge::new(runtime.clone()));
    let (tx, rx) = mpsc::channel(32);

    Harness {
        runtime,
        registry,
        connection: Connection::new(terminals, stats, tx),
        rx,
    }
}

async fn next_message(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("outbound closed")
}

#[tokio::test]
async fn test_join_then_disconnect_releases_everything() {
    let mut h = harness(&["web"]);

    h.connection
        .dispatch(ClientMessage::JoinTerminal {
            container_id: "web".into(),
        })
        .await;
    assert!(matches!(
        next_message(&mut h.rx).await,
        ServerMessage::TerminalJoined { .. }
    ));
    assert_eq!(h.registry.len(), 1);

    let feed = h.runtime.stats_feed();
    h.connection.start_stats("web".into());
    assert_eq!(h.connection.active_stats(), 1);

    // wait until the relay owns the feed
    feed.unbounded_send(Ok(bytes::Bytes::from_static(b"{}\n")))
        .unwrap();
    loop {
        match next_message(&mut h.rx).await {
            ServerMessage::ReceiveContainerStats { json_line } => {
                assert_eq!(json_line, "{}");
                break;
            }
            ServerMessage::ReceiveTerminalOutput { .. } => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    assert!(h.connection.on_disconnected());
    assert!(!h.connection.on_disconnected());

    assert!(h.registry.is_empty());
    assert!(h.runtime.wait_for_open_shells(0).await);
    assert!(wait_until(|| feed.is_closed()).await);
}

#[tokio::test]
async fn test_close_terminal_keeps_connection() {
    let mut h = harness(&["web"]);

    h.connection
        .handle_text(r#"{"type":"join_terminal","container_id":"web"}"#)
        .await;
    assert!(matches!(
        next_message(&mut h.rx).await,
        ServerMessage::TerminalJoined { .. }
    ));

    h.connection.handle_text(r#"{"type":"close_terminal"}"#).await;
    assert!(h.registry.is_empty());
    assert!(h.runtime.wait_for_open_shells(0).await);

    // a fresh join works on the same connection
    h.connection
        .dispatch(ClientMessage::JoinTerminal {
            container_id: "web".into(),
        })
        .await;
    loop {
        match next_message(&mut h.rx).await {
            ServerMessage::TerminalJoined { exec_id } => {
                assert_eq!(exec_id, "exec-2");
                break;
            }
            ServerMessage::ReceiveTerminalOutput { .. } => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_unknown_container_single_notification() {
    let mut h = harness(&["web"]);

    h.connection
        .dispatch(ClientMessage::JoinTerminal {
            container_id: "ghost".into(),
        })
        .await;

    match next_message(&mut h.rx).await {
        ServerMessage::TerminalError { message } => {
            assert!(message.starts_with("Terminal initialization failed"));
            assert!(message.contains("ghost"));
        }
        other => panic!("unexpected message: {:?}", other),
    }
    assert!(h.rx.try_recv().is_err());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_stats_error_is_reported() {
    let mut h = harness(&["web"]);

    h.connection
        .dispatch(ClientMessage::StreamStats {
            container_id: "ghost".into(),
        })
        .await;

    match next_message(&mut h.rx).await {
        ServerMessage::StatsError { message } => assert!(message.contains("ghost")),
        other => panic!("unexpected message: {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// WebSocket round trip
// ----------------------------------------------------------------------------

async fn boot_server(runtime: Arc<FakeRuntime>) -> (String, Arc<AppState>) {
    let mut config = AppConfig::default();
    // nothing listens here; host operations are not exercised
    config.docker.socket = Some("tcp://127.0.0.1:9".into());
    config.metrics.enabled = false;

    let docker = dockdeck_orchestrator::runtime::connect(&config.docker).unwrap();
    let state = Arc::new(AppState::with_runtime(config, docker, runtime));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{}/ws", addr), state)
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_websocket_terminal_round_trip() {
    let runtime = Arc::new(FakeRuntime::with_containers(&["web"]));
    let (url, state) = boot_server(runtime.clone()).await;

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

    ws.send(Message::Text(
        json!({"type": "join_terminal", "container_id": "web"}).to_string(),
    ))
    .await
    .unwrap();

    let joined = next_json(&mut ws).await;
    assert_eq!(joined["type"], "terminal_joined");
    assert_eq!(state.sessions.len(), 1);

    ws.send(Message::Text(
        json!({"type": "send_input_to_terminal", "text": "echo hi\n"}).to_string(),
    ))
    .await
    .unwrap();

    let mut output = String::new();
    while !output.contains("hi") {
        let message = next_json(&mut ws).await;
        assert_eq!(message["type"], "receive_terminal_output");
        output.push_str(message["text"].as_str().unwrap());
    }

    // binary frames are raw keystrokes
    ws.send(Message::Binary(b"echo raw\n".to_vec())).await.unwrap();
    while !output.contains("raw") {
        let message = next_json(&mut ws).await;
        output.push_str(message["text"].as_str().unwrap_or_default());
    }

    ws.send(Message::Text("{\"type\":".into())).await.unwrap();
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");

    ws.close(None).await.unwrap();

    assert!(wait_until(|| state.sessions.is_empty()).await);
    assert!(runtime.wait_for_open_shells(0).await);
}

#[tokio::test]
async fn test_websocket_alias_streams_stats() {
    let runtime = Arc::new(FakeRuntime::with_containers(&["web"]));
    let (url, _state) = boot_server(runtime).await;
    let url = url.replace("/ws", "/dockerhub");

    let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
    ws.send(Message::Text(
        json!({"type": "stream_stats", "container_id": "web"}).to_string(),
    ))
    .await
    .unwrap();

    let message = next_json(&mut ws).await;
    assert_eq!(message["type"], "receive_container_stats");
    let line: Value = serde_json::from_str(message["json_line"].as_str().unwrap()).unwrap();
    assert_eq!(line["memory_stats"]["usage"], 10485760);
}
