//! Interactive terminal session state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::SessionSummary;
use crate::runtime::ExecInput;

use super::BridgeError;

/// One interactive shell attached to a real-time connection
///
/// The session owns the input half of the exec stream. The output half lives
/// in the reader task, which stops when the session's token is cancelled.
pub struct Session {
    /// Connection this terminal belongs to
    pub connection_id: String,

    /// Container the shell runs in
    pub container_id: String,

    /// Engine exec instance id
    pub exec_id: String,

    /// When the session was joined
    pub created_at: DateTime<Utc>,

    /// Exec input, `None` once closed
    input: Mutex<Option<ExecInput>>,

    /// Stops the reader task
    cancel: CancellationToken,

    /// Reader task handle
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,

    closed: AtomicBool,
}

impl Session {
    pub fn new(
        connection_id: String,
        container_id: String,
        exec_id: String,
        input: ExecInput,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connection_id,
            container_id,
            exec_id,
            created_at: Utc::now(),
            input: Mutex::new(Some(input)),
            cancel,
            reader: std::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Token observed by the reader task
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Retain the reader task so its lifetime is tracked with the session
    pub fn attach_reader(&self, handle: JoinHandle<()>) {
        let mut slot = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(handle);
    }

    /// Whether the reader task has exited
    pub fn reader_finished(&self) -> bool {
        let slot = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write raw bytes to the shell's stdin
    pub async fn write_input(&self, data: &[u8]) -> Result<(), BridgeError> {
        let mut guard = self.input.lock().await;
        let input = guard
            .as_mut()
            .ok_or_else(|| BridgeError::StreamError("Terminal session is closed".into()))?;

        input.write_all(data).await?;
        input.flush().await?;
        Ok(())
    }

    /// Close both directions of the exec stream
    ///
    /// Returns `false` if the session was already closed. The reader is
    /// cancelled and aborted immediately; the input half is shut down on a
    /// background task.
    pub fn close(self: &Arc<Self>) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.cancel.cancel();
        if let Some(reader) = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            reader.abort();
        }

        let session = Arc::clone(self);
        tokio::spawn(async move {
            let input = session.input.lock().await.take();
            if let Some(mut input) = input {
                if let Err(e) = input.shutdown().await {
                    debug!(
                        connection_id = %session.connection_id,
                        error = %e,
                        "Exec input shutdown failed"
                    );
                }
            }
        });

        true
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            connection_id: self.connection_id.clone(),
            container_id: self.container_id.clone(),
            exec_id: self.exec_id.clone(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("container_id", &self.container_id)
            .field("exec_id", &self.exec_id)
            .field("created_at", &self.created_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn session_with_pipe() -> (Arc<Session>, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64);
        let session = Arc::new(Session::new(
            "conn-1".into(),
            "web".into(),
            "exec-1".into(),
            Box::pin(ours),
            CancellationToken::new(),
        ));
        (session, theirs)
    }

    #[tokio::test]
    async fn test_write_input_reaches_exec() {
        let (session, mut exec_side) = session_with_pipe();

        session.write_input(b"ls\n").await.unwrap();

        let mut buf = [0u8; 3];
        exec_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ls\n");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_shuts_input() {
        let (session, mut exec_side) = session_with_pipe();
        let token = session.cancellation();

        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
        assert!(token.is_cancelled());

        // The exec side observes EOF once the input half is shut down
        let mut rest = Vec::new();
        exec_side.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        let err = session.write_input(b"x").await.unwrap_err();
        assert!(matches!(err, BridgeError::StreamError(_)));
    }

    #[tokio::test]
    async fn test_close_aborts_stuck_reader() {
        let (session, _exec_side) = session_with_pipe();

        // a reader that never looks at its token
        session.attach_reader(tokio::spawn(std::future::pending::<()>()));
        assert!(!session.reader_finished());

        assert!(session.close());

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while !session.reader_finished() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(session.reader_finished());
    }
}
