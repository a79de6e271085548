//! Interactive terminal relay

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TerminalConfig;
use crate::gateway::ServerMessage;
use crate::runtime::{ExecOptions, ExecOutput, ExecStream, RuntimeClient, RuntimeError};

use super::{forward, BridgeError, OutboundSender, Session, SessionRegistry, Utf8Decoder};

/// Build the exec command that starts the first available shell
///
/// Each configured shell is probed with `command -v` and exec'd if present;
/// plain `sh` is the last resort.
pub fn shell_command(shells: &[String]) -> Vec<String> {
    let mut script = String::new();
    for shell in shells.iter().filter(|s| s.as_str() != "sh") {
        script.push_str(&format!(
            "if command -v {0} >/dev/null 2>&1; then exec {0}; fi; ",
            shell
        ));
    }
    script.push_str("exec sh");

    vec!["sh".to_string(), "-c".to_string(), script]
}

/// Relays shells running inside containers to real-time connections
pub struct TerminalBridge {
    runtime: Arc<dyn RuntimeClient>,
    registry: Arc<SessionRegistry>,
    config: TerminalConfig,
}

impl TerminalBridge {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        registry: Arc<SessionRegistry>,
        config: TerminalConfig,
    ) -> Self {
        Self {
            runtime,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a shell in `container_id` and bind it to `connection_id`
    ///
    /// Any terminal the connection already had is closed. Output is pushed to
    /// `outbound` by a reader task that stops when `cancel` fires or the
    /// session is closed.
    pub async fn join(
        &self,
        connection_id: &str,
        container_id: &str,
        outbound: OutboundSender,
        cancel: &CancellationToken,
    ) -> Result<Arc<Session>, BridgeError> {
        let options = ExecOptions::interactive(shell_command(&self.config.shells))
            .with_detach_keys(self.config.detach_keys.clone());

        let exec_id = self
            .runtime
            .create_exec(container_id, options)
            .await
            .map_err(setup_failed)?;

        let ExecStream { output, input } = self
            .runtime
            .attach_exec(&exec_id)
            .await
            .map_err(setup_failed)?;

        let session = Arc::new(Session::new(
            connection_id.to_string(),
            container_id.to_string(),
            exec_id,
            input,
            cancel.child_token(),
        ));

        self.registry.put(Arc::clone(&session));

        let reader = tokio::spawn(relay_output(
            connection_id.to_string(),
            output,
            outbound,
            session.cancellation(),
        ));
        session.attach_reader(reader);

        info!(
            connection_id = %connection_id,
            container_id = %container_id,
            exec_id = %session.exec_id,
            "Terminal session joined"
        );

        Ok(session)
    }

    /// Write client keystrokes to the connection's shell
    pub async fn send_input(&self, connection_id: &str, data: &[u8]) -> Result<(), BridgeError> {
        let session = self
            .registry
            .get(connection_id)
            .ok_or(BridgeError::NoActiveSession)?;

        session.write_input(data).await?;
        crate::metrics::record_terminal_input(data.len());
        Ok(())
    }

    /// Resize the pseudo-terminal of the connection's shell
    pub async fn resize(&self, connection_id: &str, rows: u16, cols: u16) -> Result<(), BridgeError> {
        let session = self
            .registry
            .get(connection_id)
            .ok_or(BridgeError::NoActiveSession)?;

        self.runtime
            .resize_exec(&session.exec_id, rows, cols)
            .await
            .map_err(BridgeError::from)
    }

    /// Remove and close the connection's shell
    ///
    /// Returns `false` when there was nothing to tear down.
    pub fn teardown(&self, connection_id: &str) -> bool {
        match self.registry.remove(connection_id) {
            Some(session) => {
                session.close();
                info!(
                    connection_id = %connection_id,
                    exec_id = %session.exec_id,
                    "Terminal session closed"
                );
                true
            }
            None => false,
        }
    }
}

fn setup_failed(err: RuntimeError) -> BridgeError {
    crate::metrics::record_setup_failure();
    BridgeError::SessionSetupFailed(err.to_string())
}

/// Pump exec output to the client until EOF, error, or cancellation
async fn relay_output(
    connection_id: String,
    mut output: ExecOutput,
    outbound: OutboundSender,
    cancel: CancellationToken,
) {
    let mut decoder = Utf8Decoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(connection_id = %connection_id, "Terminal reader cancelled");
                break;
            }
            next = output.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                if chunk.is_empty() {
                    continue;
                }
                crate::metrics::record_terminal_output(chunk.len());

                let text = decoder.decode(&chunk);
                if text.is_empty() {
                    continue;
                }
                if !forward(&outbound, &cancel, ServerMessage::ReceiveTerminalOutput { text }).await
                {
                    break;
                }
            }
            Some(Err(e)) => {
                warn!(connection_id = %connection_id, error = %e, "Terminal stream failed");
                let message = format!("Terminal stream error: {}", e);
                forward(&outbound, &cancel, ServerMessage::TerminalError { message }).await;
                break;
            }
            None => {
                let text = decoder.finish();
                if !text.is_empty() {
                    forward(&outbound, &cancel, ServerMessage::ReceiveTerminalOutput { text }).await;
                }
                debug!(connection_id = %connection_id, "Terminal stream reached end of file");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bytes::Bytes;
    use crate::runtime::{ExecInput, MockRuntimeClient};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[test]
    fn test_shell_command_fallback_order() {
        let cmd = shell_command(&["bash".to_string(), "sh".to_string()]);
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert_eq!(
            cmd[2],
            "if command -v bash >/dev/null 2>&1; then exec bash; fi; exec sh"
        );

        let cmd = shell_command(&["zsh".to_string(), "bash".to_string()]);
        assert!(cmd[2].find("zsh").unwrap() < cmd[2].find("bash").unwrap());
        assert!(cmd[2].ends_with("exec sh"));
    }

    #[tokio::test]
    async fn test_join_missing_container_registers_nothing() {
        let mut runtime = MockRuntimeClient::new();
        runtime
            .expect_create_exec()
            .returning(|id, _| Err(RuntimeError::ContainerNotFound(id.to_string())));
        runtime.expect_attach_exec().never();

        let registry = Arc::new(SessionRegistry::new());
        let bridge = TerminalBridge::new(
            Arc::new(runtime),
            Arc::clone(&registry),
            TerminalConfig::default(),
        );
        let (tx, _rx) = mpsc::channel(4);

        let err = bridge
            .join("c1", "ghost", tx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::SessionSetupFailed(_)));
        assert!(err.to_string().contains("ghost"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_join_engine_down_is_setup_failure() {
        let mut runtime = MockRuntimeClient::new();
        runtime.expect_create_exec().returning(|_, _| Ok("exec-9".to_string()));
        runtime
            .expect_attach_exec()
            .returning(|_| Err(RuntimeError::EngineUnavailable("connection refused".into())));

        let registry = Arc::new(SessionRegistry::new());
        let bridge = TerminalBridge::new(
            Arc::new(runtime),
            Arc::clone(&registry),
            TerminalConfig::default(),
        );
        let (tx, _rx) = mpsc::channel(4);

        let err = bridge
            .join("c1", "web", tx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_setup_failure());
        assert!(registry.get("c1").is_none());
    }

    #[tokio::test]
    async fn test_reader_failure_reported_once_and_session_kept() {
        let mut runtime = MockRuntimeClient::new();
        runtime.expect_create_exec().returning(|_, _| Ok("exec-1".to_string()));
        runtime.expect_attach_exec().times(1).returning(|_| {
            let chunks: Vec<Result<Bytes, RuntimeError>> = vec![
                Ok(Bytes::from_static(b"hi")),
                Err(RuntimeError::Engine("reset".into())),
                Ok(Bytes::from_static(b"late")),
            ];
            let output: ExecOutput = Box::pin(futures::stream::iter(chunks));
            let input: ExecInput = Box::pin(tokio::io::sink());
            Ok(ExecStream { output, input })
        });

        let registry = Arc::new(SessionRegistry::new());
        let bridge = TerminalBridge::new(
            Arc::new(runtime),
            Arc::clone(&registry),
            TerminalConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(4);

        bridge
            .join("c1", "web", tx, &CancellationToken::new())
            .await
            .unwrap();

        let wait = Duration::from_secs(5);
        assert_eq!(
            timeout(wait, rx.recv()).await.unwrap(),
            Some(ServerMessage::ReceiveTerminalOutput { text: "hi".into() })
        );
        match timeout(wait, rx.recv()).await.unwrap() {
            Some(ServerMessage::TerminalError { message }) => {
                assert!(message.starts_with("Terminal stream error"));
                assert!(message.contains("reset"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        // the reader exits and drops its sender; "late" is never relayed
        assert_eq!(timeout(wait, rx.recv()).await.unwrap(), None);

        // cleanup is left to disconnect
        assert!(registry.get("c1").is_some());
    }

    #[tokio::test]
    async fn test_input_without_session() {
        let mut runtime = MockRuntimeClient::new();
        runtime.expect_resize_exec().never();

        let bridge = TerminalBridge::new(
            Arc::new(runtime),
            Arc::new(SessionRegistry::new()),
            TerminalConfig::default(),
        );

        let err = bridge.send_input("nobody", b"ls\n").await.unwrap_err();
        assert!(matches!(err, BridgeError::NoActiveSession));

        let err = bridge.resize("nobody", 24, 80).await.unwrap_err();
        assert!(matches!(err, BridgeError::NoActiveSession));

        assert!(!bridge.teardown("nobody"));
    }
}
