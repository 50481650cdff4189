//! treehouse-core: worktree lifecycle and project aggregation
//!
//! This library owns everything about base repositories and the git
//! worktrees derived from them. It is used by `treehouse-server`, which adds
//! the agent sessions and the HTTP/WebSocket transport on top.
//!
//! # Main Entry Points
//!
//! - [`worktrees`] - Worktree Store and Lifecycle Manager
//! - [`projects`] - Base project registry and the aggregated projects view
//! - [`git`] - git CLI and libgit2 access
//! - [`config`] - Configuration management

pub mod config;
pub mod errors;
pub mod git;
pub mod logging;
pub mod projects;
pub mod worktrees;

// Re-export commonly used types at crate root for convenience
pub use config::TreehouseConfig;
pub use errors::{ErrorKind, TreehouseError};
pub use projects::{BaseProject, Project, ProjectError, ProjectRegistry, list_projects};
pub use worktrees::{WorktreeError, WorktreeManager, WorktreeRecord, WorktreeState, WorktreeStore};

// Re-export logging initialization
pub use logging::init_logging;
