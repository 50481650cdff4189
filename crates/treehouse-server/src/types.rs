use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of one WebSocket connection.
pub type ConnectionId = String;

/// Per-start options sent by the client alongside the command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    /// Working directory; wins over `project_path`.
    pub cwd: Option<PathBuf>,
    pub project_path: Option<PathBuf>,
    /// Extra arguments placed after the configured agent args.
    pub args: Vec<String>,
    /// Merged over the inherited environment.
    pub env: HashMap<String, String>,
    /// Conversation id to resume (`--resume <id>`).
    pub resume: Option<String>,
}

/// Session lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    Exited { code: Option<i32> },
    Failed { error: String },
}

/// Session metadata for the wire (`GET /api/sessions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub connection_id: Option<ConnectionId>,
    pub command: String,
    pub working_directory: PathBuf,
    pub state: SessionState,
    pub pid: Option<u32>,
    pub created_at: String,
}
