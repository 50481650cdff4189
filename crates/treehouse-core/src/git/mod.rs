pub mod backend;
pub mod cli;
pub mod errors;
pub mod operations;
pub mod types;

pub use backend::{GitBackend, GitCli, test_helpers};
pub use errors::GitError;
pub use operations::{branch_exists, is_git_repo, list_worktrees};
pub use types::GitWorktree;
