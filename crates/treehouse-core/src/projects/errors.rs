use crate::errors::{ErrorKind, TreehouseError};
use crate::git::errors::GitError;

/// Note: not `Clone`, because `io::Error` and `GitError` are not.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Project path not found: {path}")]
    PathNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path is not a directory: {path}")]
    NotADirectory { path: String },

    #[error("Path is not a git repository: {path}")]
    NotAGitRepo { path: String },

    #[error("Git repository check failed: {source}")]
    GitCheckFailed {
        #[from]
        source: GitError,
    },

    #[error("Failed to save projects: {message}")]
    SaveFailed { message: String },
}

impl TreehouseError for ProjectError {
    fn error_code(&self) -> &'static str {
        match self {
            ProjectError::PathNotFound { .. } => "PROJECT_PATH_NOT_FOUND",
            ProjectError::NotADirectory { .. } => "PROJECT_NOT_A_DIRECTORY",
            ProjectError::NotAGitRepo { .. } => "PROJECT_NOT_GIT_REPO",
            ProjectError::GitCheckFailed { .. } => "PROJECT_GIT_CHECK_FAILED",
            ProjectError::SaveFailed { .. } => "PROJECT_SAVE_FAILED",
        }
    }

    fn kind(&self) -> ErrorKind {
        // Exhaustive match ensures new variants force an explicit classification.
        match self {
            ProjectError::PathNotFound { .. } => ErrorKind::NotFound,
            ProjectError::NotADirectory { .. } | ProjectError::NotAGitRepo { .. } => {
                ErrorKind::InvalidInput
            }
            ProjectError::GitCheckFailed { .. } => ErrorKind::ExternalTool,
            ProjectError::SaveFailed { .. } => ErrorKind::Internal,
        }
    }
}
