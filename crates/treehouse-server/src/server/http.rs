use std::path::PathBuf;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use treehouse_core::{
    BaseProject, ErrorKind, Project, WorktreeRecord, list_projects as aggregate_projects,
};

use crate::errors::ApiError;
use crate::server::AppState;
use crate::server::auth::AuthUser;
use crate::types::SessionInfo;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_projects(State(state): State<AppState>) -> Json<Vec<Project>> {
    Json(aggregate_projects(&state.projects, &state.manager))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorktreeRequest {
    pub branch: String,
    pub project_path: PathBuf,
    #[serde(default)]
    pub project_name: Option<String>,
}

/// A worktree record plus the project entry it appears as.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeSummary {
    #[serde(flatten)]
    pub record: WorktreeRecord,
    pub name: String,
    pub display_name: String,
}

/// A worktree task that panicked or was cancelled.
fn operation_failed(e: tokio::task::JoinError) -> ApiError {
    ApiError::new(
        ErrorKind::Internal,
        "WORKTREE_OPERATION_ABORTED",
        format!("Worktree operation did not complete: {e}"),
    )
}

pub async fn create_worktree(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(label): Path<String>,
    body: Result<Json<CreateWorktreeRequest>, JsonRejection>,
) -> Result<Json<WorktreeSummary>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::invalid_input(e.body_text()))?;

    // Unknown repositories are registered only once a worktree exists
    let known = state.projects.find_by_path(&request.project_path);
    let base = match &known {
        Some(base) => base.clone(),
        None => BaseProject::new(&request.project_path, request.project_name, None)?,
    };

    let manager = state.manager.clone();
    let base_path = base.path.clone();
    let branch = request.branch;
    // Own task: a client that disconnects mid-request must not abandon the git work
    let record = tokio::spawn(async move { manager.create(&base_path, &branch, &label).await })
        .await
        .map_err(operation_failed)??;

    if known.is_none()
        && let Err(e) = state.projects.insert(base.clone())
    {
        warn!(
            event = "server.http.project_register_failed",
            path = %base.path.display(),
            error = %e,
        );
    }

    info!(
        event = "server.http.worktree_created",
        user = %user,
        project = %base.name,
        label = %record.label,
        branch = %record.branch,
    );

    Ok(Json(WorktreeSummary {
        name: format!("{}-{}", base.name, record.label),
        display_name: format!("{} - {}", base.display_name, record.label),
        record,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectQuery {
    pub project_path: PathBuf,
}

pub async fn delete_worktree(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Path(label): Path<String>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Json<WorktreeRecord>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let manager = state.manager.clone();
    let record = tokio::spawn(async move { manager.delete(&query.project_path, &label).await })
        .await
        .map_err(operation_failed)??;

    info!(
        event = "server.http.worktree_deleted",
        user = %user,
        base_path = %record.base_path.display(),
        label = %record.label,
    );
    Ok(Json(record))
}

pub async fn list_worktrees(
    State(state): State<AppState>,
    query: Result<Query<ProjectQuery>, QueryRejection>,
) -> Result<Json<Vec<WorktreeRecord>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    Ok(Json(state.manager.list(&query.project_path)))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.orchestrator.registry().list())
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_directory: bool,
}

/// Directory listing, directories first, then by name.
pub async fn list_files(
    query: Result<Query<FilesQuery>, QueryRejection>,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let path = query.path;

    let metadata = tokio::fs::metadata(&path).await.map_err(|_| {
        ApiError::new(
            ErrorKind::NotFound,
            "PATH_NOT_FOUND",
            format!("Path '{}' does not exist", path.display()),
        )
    })?;
    if !metadata.is_dir() {
        return Err(ApiError::new(
            ErrorKind::InvalidInput,
            "NOT_A_DIRECTORY",
            format!("Path '{}' is not a directory", path.display()),
        ));
    }

    let mut dir = tokio::fs::read_dir(&path).await.map_err(|e| {
        ApiError::new(
            ErrorKind::Internal,
            "FILES_READ_FAILED",
            format!("Failed to read '{}': {}", path.display(), e),
        )
    })?;

    let mut entries = Vec::new();
    loop {
        let entry = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                return Err(ApiError::new(
                    ErrorKind::Internal,
                    "FILES_READ_FAILED",
                    format!("Failed to read '{}': {}", path.display(), e),
                ));
            }
        };
        let is_directory = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            is_directory,
        });
    }

    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(Json(entries))
}
