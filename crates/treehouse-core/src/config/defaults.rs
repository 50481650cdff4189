//! Default implementations for configuration types.
//!
//! Used by `#[serde(default = "...")]` attributes and `Default` impls.

use crate::config::types::{AgentConfig, ServerConfig, TreehouseConfig, WorktreesConfig};
use std::path::PathBuf;

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    3001
}

pub fn default_git_timeout_secs() -> u64 {
    60
}

pub fn default_force_remove() -> bool {
    true
}

pub fn default_executable() -> String {
    "claude".to_string()
}

/// Grace period between SIGTERM and SIGKILL when terminating a session.
pub fn default_terminate_grace_ms() -> u64 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            auth_token: None,
            idle_timeout_secs: None,
        }
    }
}

impl Default for WorktreesConfig {
    fn default() -> Self {
        Self {
            root: None,
            git_timeout_secs: default_git_timeout_secs(),
            force_remove: default_force_remove(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            args: Vec::new(),
            terminate_grace_ms: default_terminate_grace_ms(),
            max_sessions_per_connection: None,
        }
    }
}

impl TreehouseConfig {
    /// Directory for persisted state.
    ///
    /// Resolution: `TREEHOUSE_DATA_DIR` env var, `[storage].data_dir`,
    /// `~/.treehouse`, then a temp-dir fallback when no home is available.
    pub fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("TREEHOUSE_DATA_DIR")
            && !dir.is_empty()
        {
            return PathBuf::from(dir);
        }

        if let Some(dir) = &self.storage.data_dir {
            return dir.clone();
        }

        match dirs::home_dir() {
            Some(home) => home.join(".treehouse"),
            None => {
                tracing::warn!(
                    event = "core.config.home_dir_not_found",
                    "Could not determine home directory - using temp dir for state"
                );
                std::env::temp_dir().join(".treehouse")
            }
        }
    }

    /// Root directory under which worktrees are created.
    pub fn worktrees_root(&self) -> PathBuf {
        match &self.worktrees.root {
            Some(root) => root.clone(),
            None => self.data_dir().join("worktrees"),
        }
    }
}
