//! Real-time message protocol
//!
//! JSON text frames tagged by `type`. Binary frames carry raw terminal input
//! and have no message wrapper.

use serde::{Deserialize, Serialize};

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open an interactive shell in a container
    JoinTerminal { container_id: String },

    /// Keystrokes for the connection's shell
    SendInputToTerminal { text: String },

    /// Terminal window size changed
    ResizeTerminal { rows: u16, cols: u16 },

    /// Close the connection's shell without disconnecting
    CloseTerminal,

    /// Start relaying live stats for a container
    StreamStats { container_id: String },
}

/// Messages sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    TerminalJoined { exec_id: String },

    ReceiveTerminalOutput { text: String },

    TerminalError { message: String },

    /// One stats document, exactly as emitted by the engine
    ReceiveContainerStats { json_line: String },

    StatsError { message: String },

    /// Frame could not be understood
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_client_message_wire_format() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"type":"join_terminal","container_id":"web"}"#).unwrap();
        assert_eq!(
            join,
            ClientMessage::JoinTerminal {
                container_id: "web".into()
            }
        );

        let close: ClientMessage = serde_json::from_str(r#"{"type":"close_terminal"}"#).unwrap();
        assert_eq!(close, ClientMessage::CloseTerminal);

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn test_server_message_wire_format() {
        let json = serde_json::to_value(ServerMessage::ReceiveContainerStats {
            json_line: "{}".into(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "receive_container_stats", "json_line": "{}"})
        );
    }
}
