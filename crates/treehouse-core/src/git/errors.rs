use crate::errors::{ErrorKind, TreehouseError};

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Repository not found at path: {path}")]
    RepositoryNotFound { path: String },

    #[error("Branch '{branch}' is already checked out at {path}")]
    BranchCheckedOut { branch: String, path: String },

    #[error("Invalid {label}: {message}")]
    InvalidArgument { label: String, message: String },

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("git {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Git2 library error: {source}")]
    Git2Error {
        #[from]
        source: git2::Error,
    },

    #[error("IO error during git operation: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl GitError {
    /// Captured stderr of a failed command, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            GitError::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

impl TreehouseError for GitError {
    fn error_code(&self) -> &'static str {
        match self {
            GitError::RepositoryNotFound { .. } => "REPOSITORY_NOT_FOUND",
            GitError::BranchCheckedOut { .. } => "BRANCH_CHECKED_OUT",
            GitError::InvalidArgument { .. } => "INVALID_GIT_ARGUMENT",
            GitError::CommandFailed { .. } => "GIT_COMMAND_FAILED",
            GitError::Timeout { .. } => "GIT_TIMEOUT",
            GitError::Git2Error { .. } => "GIT2_ERROR",
            GitError::IoError { .. } => "GIT_IO_ERROR",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            GitError::RepositoryNotFound { .. } => ErrorKind::NotFound,
            GitError::BranchCheckedOut { .. } => ErrorKind::Conflict,
            GitError::InvalidArgument { .. } => ErrorKind::InvalidInput,
            GitError::CommandFailed { .. }
            | GitError::Timeout { .. }
            | GitError::Git2Error { .. }
            | GitError::IoError { .. } => ErrorKind::ExternalTool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_carries_stderr() {
        let error = GitError::CommandFailed {
            command: "worktree add".to_string(),
            stderr: "fatal: invalid reference: nope".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "git worktree add failed: fatal: invalid reference: nope"
        );
        assert_eq!(error.stderr(), Some("fatal: invalid reference: nope"));
        assert_eq!(error.kind(), ErrorKind::ExternalTool);
        assert!(!error.is_user_error());
    }

    #[test]
    fn test_timeout_is_external_tool() {
        let error = GitError::Timeout {
            command: "worktree remove".to_string(),
            secs: 60,
        };
        assert_eq!(error.error_code(), "GIT_TIMEOUT");
        assert_eq!(error.kind(), ErrorKind::ExternalTool);
        assert!(error.stderr().is_none());
    }

    #[test]
    fn test_branch_checked_out_is_conflict() {
        let error = GitError::BranchCheckedOut {
            branch: "main".to_string(),
            path: "/repo".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert!(error.is_user_error());
    }
}
