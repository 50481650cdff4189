use crate::errors::{ErrorKind, TreehouseError};
use crate::git::errors::GitError;

#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("Base project not found at path: {path}")]
    BaseProjectNotFound { path: String },

    #[error("Worktree '{label}' not found")]
    NotFound { label: String },

    #[error("Worktree label '{label}' is already taken")]
    LabelTaken { label: String },

    #[error("Branch '{branch}' is already checked out at {path}")]
    BranchInUse { branch: String, path: String },

    #[error("Another operation on worktree '{label}' is in progress")]
    OperationInProgress { label: String },

    #[error("Worktree path already exists: {path}")]
    PathExists { path: String },

    #[error("Invalid worktree label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    #[error("Invalid branch name '{branch}': {reason}")]
    InvalidBranch { branch: String, reason: String },

    #[error("Git operation failed: {source}")]
    GitError {
        #[from]
        source: GitError,
    },

    #[error("Failed to persist worktree records: {message}")]
    PersistenceFailed { message: String },

    #[error("IO operation failed: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl WorktreeError {
    /// stderr of the failed git command, when the failure came from git.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            WorktreeError::GitError { source } => source.stderr(),
            _ => None,
        }
    }
}

impl TreehouseError for WorktreeError {
    fn error_code(&self) -> &'static str {
        match self {
            WorktreeError::BaseProjectNotFound { .. } => "BASE_PROJECT_NOT_FOUND",
            WorktreeError::NotFound { .. } => "WORKTREE_NOT_FOUND",
            WorktreeError::LabelTaken { .. } => "WORKTREE_LABEL_TAKEN",
            WorktreeError::BranchInUse { .. } => "BRANCH_IN_USE",
            WorktreeError::OperationInProgress { .. } => "WORKTREE_OPERATION_IN_PROGRESS",
            WorktreeError::PathExists { .. } => "WORKTREE_PATH_EXISTS",
            WorktreeError::InvalidLabel { .. } => "INVALID_WORKTREE_LABEL",
            WorktreeError::InvalidBranch { .. } => "INVALID_BRANCH_NAME",
            WorktreeError::GitError { source } => source.error_code(),
            WorktreeError::PersistenceFailed { .. } => "WORKTREE_PERSISTENCE_FAILED",
            WorktreeError::IoError { .. } => "WORKTREE_IO_ERROR",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            WorktreeError::BaseProjectNotFound { .. } | WorktreeError::NotFound { .. } => {
                ErrorKind::NotFound
            }
            WorktreeError::LabelTaken { .. }
            | WorktreeError::BranchInUse { .. }
            | WorktreeError::OperationInProgress { .. }
            | WorktreeError::PathExists { .. } => ErrorKind::Conflict,
            WorktreeError::InvalidLabel { .. } | WorktreeError::InvalidBranch { .. } => {
                ErrorKind::InvalidInput
            }
            WorktreeError::GitError { source } => source.kind(),
            WorktreeError::PersistenceFailed { .. } | WorktreeError::IoError { .. } => {
                ErrorKind::Internal
            }
        }
    }
}
