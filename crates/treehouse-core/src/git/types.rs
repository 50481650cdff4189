use std::path::PathBuf;

/// A checkout known to git for a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct GitWorktree {
    /// Working directory of the checkout.
    pub path: PathBuf,
    /// Checked-out branch, `None` for a detached HEAD.
    pub branch: Option<String>,
    /// True for the repository's own working directory.
    pub is_main: bool,
}

impl GitWorktree {
    pub fn new(path: PathBuf, branch: Option<String>, is_main: bool) -> Self {
        Self {
            path,
            branch,
            is_main,
        }
    }
}
