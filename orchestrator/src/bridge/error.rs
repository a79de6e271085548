//! Session bridge error taxonomy

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Failures surfaced to the real-time client
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Terminal initialization failed: {0}")]
    SessionSetupFailed(String),

    #[error("No active terminal session.")]
    NoActiveSession,

    #[error("{0}")]
    StreamError(String),

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl BridgeError {
    /// Stable code used in logs and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::SessionSetupFailed(_) => "SESSION_SETUP_FAILED",
            BridgeError::NoActiveSession => "NO_ACTIVE_SESSION",
            BridgeError::StreamError(_) => "STREAM_ERROR",
            BridgeError::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
        }
    }

    /// Whether the error happened before a session existed
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::SessionSetupFailed(_) | BridgeError::EngineUnavailable(_)
        )
    }

    /// Metrics label for where the error happened
    pub fn stage(&self) -> &'static str {
        if self.is_setup_failure() {
            "setup"
        } else {
            "session"
        }
    }
}

impl From<RuntimeError> for BridgeError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::EngineUnavailable(msg) => BridgeError::EngineUnavailable(msg),
            other => BridgeError::StreamError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::StreamError(err.to_string())
    }
}
