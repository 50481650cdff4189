//! Configuration type definitions for treehouse.
//!
//! These types are serialized/deserialized from TOML config files.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1"
//! port = 3001
//! auth_token = "s3cret"
//!
//! [worktrees]
//! root = "/home/me/worktrees"
//! git_timeout_secs = 60
//!
//! [agent]
//! executable = "claude"
//! args = ["--print"]
//!
//! [[projects]]
//! path = "/repo/agendamente"
//! display_name = "Agendamente"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration loaded from TOML config files.
///
/// Loaded from (later wins):
/// 1. User config: `~/.treehouse/config.toml`
/// 2. Project config: `./.treehouse/config.toml`
/// 3. An explicit `--config` file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TreehouseConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub worktrees: WorktreesConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    /// Base repositories shown in the projects list
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "super::defaults::default_bind")]
    pub bind: String,

    #[serde(default = "super::defaults::default_port")]
    pub port: u16,

    /// Bearer token required on `/api/*` and `/ws`. No token means no auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Close WebSocket connections that send nothing for this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding `worktrees.json` and `projects.json`.
    /// Default: `~/.treehouse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreesConfig {
    /// Root under which `{base}/{label}` worktrees are created.
    /// Default: `<data_dir>/worktrees`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    /// Upper bound for a single `git worktree add/remove` invocation.
    #[serde(default = "super::defaults::default_git_timeout_secs")]
    pub git_timeout_secs: u64,

    /// Pass `--force` to `git worktree remove`.
    #[serde(default = "super::defaults::default_force_remove")]
    pub force_remove: bool,
}

/// The wrapped coding-assistant CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "super::defaults::default_executable")]
    pub executable: String,

    /// Arguments placed before per-request arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Time between SIGTERM and a forced kill on terminate.
    #[serde(default = "super::defaults::default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions_per_connection: Option<usize>,
}

/// A `[[projects]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectEntry {
    pub path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = TreehouseConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: TreehouseConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.server.port, parsed.server.port);
        assert_eq!(config.agent.executable, parsed.agent.executable);
    }

    #[test]
    fn test_projects_array_deserialize() {
        let toml_str = r#"
[[projects]]
path = "/repo/agendamente"

[[projects]]
path = "/repo/other"
name = "other-app"
display_name = "Other App"
"#;
        let config: TreehouseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.projects.len(), 2);
        assert_eq!(config.projects[0].path, PathBuf::from("/repo/agendamente"));
        assert!(config.projects[0].name.is_none());
        assert_eq!(config.projects[1].display_name.as_deref(), Some("Other App"));
    }

    #[test]
    fn test_partial_sections_get_defaults() {
        let toml_str = r#"
[agent]
executable = "sh"
"#;
        let config: TreehouseConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agent.executable, "sh");
        assert_eq!(config.agent.terminate_grace_ms, 3000);
        assert_eq!(config.worktrees.git_timeout_secs, 60);
        assert!(config.worktrees.force_remove);
    }
}
