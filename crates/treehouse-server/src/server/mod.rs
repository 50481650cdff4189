//! HTTP + WebSocket transport
//!
//! `build_router` wires the handlers; `serve` runs them until the shutdown
//! token fires and then terminates every running session.

pub mod auth;
pub mod http;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use treehouse_core::{ProjectRegistry, TreehouseConfig, WorktreeManager};

use crate::errors::ServerError;
use crate::session::SessionOrchestrator;

pub use auth::{AuthOutcome, Authenticator, StaticToken};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<WorktreeManager>,
    pub projects: Arc<ProjectRegistry>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub authenticator: Arc<dyn Authenticator>,
    /// Close WebSocket connections idle for this long.
    pub idle_timeout: Option<Duration>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the state from config and reconcile the worktree store against
    /// git for every known base project.
    pub fn from_config(
        config: &TreehouseConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ServerError> {
        let projects = ProjectRegistry::from_config(config);
        let manager = WorktreeManager::from_config(config)?;

        let bases: Vec<_> = projects.list().into_iter().map(|p| p.path).collect();
        let report = manager.reconcile_all(&bases);
        info!(
            event = "server.state.reconciled",
            bases = bases.len(),
            dropped = report.dropped,
            adopted = report.adopted,
        );

        Ok(Self {
            manager: Arc::new(manager),
            projects: Arc::new(projects),
            orchestrator: Arc::new(SessionOrchestrator::new(config.agent.clone())),
            authenticator: Arc::new(StaticToken::new(config.server.auth_token.clone())),
            idle_timeout: config.server.idle_timeout_secs.map(Duration::from_secs),
            shutdown,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/projects", get(http::list_projects))
        .route("/api/worktree/create/{label}", post(http::create_worktree))
        .route("/api/worktree/{label}", delete(http::delete_worktree))
        .route("/api/worktrees", get(http::list_worktrees))
        .route("/api/sessions", get(http::list_sessions))
        .route("/api/files", get(http::list_files))
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/api/health", get(http::health))
        .merge(protected)
        .with_state(state)
}

/// Serve on an already-bound listener until `state.shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    let addr = listener.local_addr()?;
    info!(event = "server.http.listening", addr = %addr);

    let shutdown = state.shutdown.clone();
    let orchestrator = state.orchestrator.clone();
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!(event = "server.http.stopping", sessions = orchestrator.registry().len());
    orchestrator.stop_all().await;
    info!(event = "server.http.stopped");
    Ok(())
}

/// Bind `server.bind:server.port` and serve until `shutdown` fires.
pub async fn run_server(
    config: &TreehouseConfig,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let state = AppState::from_config(config, shutdown)?;

    if config.server.auth_token.is_none() {
        warn!(
            event = "server.auth.disabled",
            "No auth token configured - every request is accepted"
        );
    }

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    serve(listener, state).await
}
