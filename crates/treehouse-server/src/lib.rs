//! treehouse-server: agent sessions and the HTTP/WebSocket transport
//!
//! Builds on `treehouse-core` for worktrees and projects. Sessions are
//! independent child processes of the configured agent CLI, streamed to
//! the WebSocket connection that started them.
//!
//! # Main Entry Points
//!
//! - [`server`] - router, auth seam and `run_server`
//! - [`session`] - Session Registry and Session Orchestrator
//! - [`protocol`] - WebSocket message types

pub mod errors;
pub mod protocol;
pub mod server;
pub mod session;
pub mod types;

pub use errors::{ApiError, ServerError, SessionError};
pub use server::{AppState, build_router, run_server, serve};
pub use session::{SessionOrchestrator, SessionRegistry};
