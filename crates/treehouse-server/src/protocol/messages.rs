use serde::{Deserialize, Serialize};

use crate::types::SessionOptions;

/// Client -> server messages on the WebSocket.
///
/// Each variant maps to a JSON text frame with `"type"` as the tag field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a new agent session.
    #[serde(rename_all = "camelCase")]
    Start {
        /// Prompt or command passed as the final argument (omitted when empty).
        #[serde(default)]
        command: String,
        #[serde(default)]
        options: SessionOptions,
        /// Echoed back in `started` so the client can correlate.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Stop { session_id: String },

    /// Route a live session's output to this connection.
    #[serde(rename_all = "camelCase")]
    Attach { session_id: String },

    Ping,
}

/// Which pipe an output chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Server -> client events on the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    Attached { session_id: String },

    #[serde(rename_all = "camelCase")]
    Output {
        session_id: String,
        stream: OutputStream,
        chunk: String,
    },

    /// Terminal event; `code` is null when the process died from a signal.
    #[serde(rename_all = "camelCase")]
    Exit {
        session_id: String,
        code: Option<i32>,
    },

    /// `session_id` is absent for errors not tied to a session
    /// (malformed frames, rejected starts).
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        code: String,
        error: String,
    },

    Pong,
}

impl ServerEvent {
    pub fn error(session_id: Option<String>, code: &str, error: impl Into<String>) -> Self {
        ServerEvent::Error {
            session_id,
            code: code.to_string(),
            error: error.into(),
        }
    }
}
