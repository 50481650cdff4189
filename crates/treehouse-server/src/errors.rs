use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use treehouse_core::errors::ConfigError;
use treehouse_core::{ErrorKind, ProjectError, TreehouseError, WorktreeError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session '{id}' not found")]
    NotFound { id: String },

    #[error("Connection already owns {limit} sessions")]
    LimitReached { limit: usize },

    #[error("Failed to spawn '{program}': {message}")]
    SpawnFailed { program: String, message: String },
}

impl TreehouseError for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            SessionError::NotFound { .. } => "SESSION_NOT_FOUND",
            SessionError::LimitReached { .. } => "SESSION_LIMIT_REACHED",
            SessionError::SpawnFailed { .. } => "SESSION_SPAWN_FAILED",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound { .. } => ErrorKind::NotFound,
            SessionError::LimitReached { .. } => ErrorKind::Conflict,
            SessionError::SpawnFailed { .. } => ErrorKind::ExternalTool,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Worktree store error: {source}")]
    Worktree {
        #[from]
        source: WorktreeError,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl TreehouseError for ServerError {
    fn error_code(&self) -> &'static str {
        match self {
            ServerError::Config { source } => source.error_code(),
            ServerError::Worktree { source } => source.error_code(),
            ServerError::Bind { .. } => "SERVER_BIND_FAILED",
            ServerError::Io { .. } => "SERVER_IO_ERROR",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Config { source } => source.kind(),
            ServerError::Worktree { source } => source.kind(),
            ServerError::Bind { .. } | ServerError::Io { .. } => ErrorKind::Internal,
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ExternalTool => StatusCode::BAD_GATEWAY,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error returned by HTTP handlers, rendered as
/// `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(kind: ErrorKind, code: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            ErrorKind::Unauthorized,
            "UNAUTHORIZED",
            "missing or invalid bearer token",
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, "INVALID_REQUEST", message)
    }
}

fn from_treehouse_error<E: TreehouseError>(e: &E) -> ApiError {
    if e.is_user_error() {
        warn!(event = "server.http.request_rejected", code = e.error_code(), error = %e);
    } else {
        error!(event = "server.http.request_failed", code = e.error_code(), error = %e);
    }
    ApiError::new(e.kind(), e.error_code(), e.to_string())
}

impl From<WorktreeError> for ApiError {
    fn from(e: WorktreeError) -> Self {
        from_treehouse_error(&e)
    }
}

impl From<ProjectError> for ApiError {
    fn from(e: ProjectError) -> Self {
        from_treehouse_error(&e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        from_treehouse_error(&e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: &self.code,
                message: &self.message,
            },
        };
        (status_for(self.kind), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::ExternalTool), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_worktree_error_converts_with_code() {
        let api: ApiError = WorktreeError::LabelTaken {
            label: "V2".to_string(),
        }
        .into();
        assert_eq!(api.kind, ErrorKind::Conflict);
        assert_eq!(api.code, "WORKTREE_LABEL_TAKEN");
        assert_eq!(api.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_session_error_kinds() {
        let err = SessionError::NotFound {
            id: "abc".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.error_code(), "SESSION_NOT_FOUND");

        let err = SessionError::SpawnFailed {
            program: "claude".to_string(),
            message: "No such file or directory".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        assert!(!err.is_user_error());
    }
}
