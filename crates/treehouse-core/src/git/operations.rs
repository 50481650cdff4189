use git2::{BranchType, Repository, WorktreeLockStatus};
use std::path::Path;
use tracing::{debug, warn};

use super::errors::GitError;
use super::types::GitWorktree;

fn open_repo(repo_path: &Path) -> Result<Repository, GitError> {
    Repository::open(repo_path).map_err(|e| {
        debug!(
            event = "core.git.repo_open_failed",
            path = %repo_path.display(),
            error = %e,
        );
        GitError::RepositoryNotFound {
            path: repo_path.display().to_string(),
        }
    })
}

/// Check if a path is inside a git repository.
///
/// Returns `Ok(false)` for "not a repository"; other libgit2 failures
/// (permission denied, corrupt repo) are errors.
pub fn is_git_repo(path: &Path) -> Result<bool, GitError> {
    match Repository::discover(path) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        Err(e) => Err(GitError::Git2Error { source: e }),
    }
}

pub fn branch_exists(repo_path: &Path, branch: &str) -> Result<bool, GitError> {
    let repo = open_repo(repo_path)?;
    Ok(repo.find_branch(branch, BranchType::Local).is_ok())
}

/// Branch the repository's HEAD points at, including an unborn branch.
fn head_branch(repo: &Repository) -> Option<String> {
    if let Ok(head) = repo.head() {
        return if head.is_branch() {
            head.shorthand().map(str::to_string)
        } else {
            None
        };
    }

    // Unborn HEAD (no commits yet): read the symbolic target directly
    repo.find_reference("HEAD")
        .ok()
        .and_then(|r| r.symbolic_target().map(str::to_string))
        .and_then(|t| t.strip_prefix("refs/heads/").map(str::to_string))
}

/// List every checkout of a repository: the main working directory first,
/// then linked worktrees whose directories still exist.
pub fn list_worktrees(repo_path: &Path) -> Result<Vec<GitWorktree>, GitError> {
    let repo = open_repo(repo_path)?;
    let mut result = Vec::new();

    if let Some(workdir) = repo.workdir() {
        result.push(GitWorktree::new(
            workdir.to_path_buf(),
            head_branch(&repo),
            true,
        ));
    }

    let names = repo.worktrees()?;
    for name in names.iter().flatten() {
        let worktree = match repo.find_worktree(name) {
            Ok(wt) => wt,
            Err(e) => {
                warn!(
                    event = "core.git.worktree_lookup_failed",
                    repo = %repo_path.display(),
                    name = name,
                    error = %e,
                );
                continue;
            }
        };

        let path = worktree.path().to_path_buf();
        if !path.exists() {
            let locked = matches!(worktree.is_locked(), Ok(WorktreeLockStatus::Locked(_)));
            debug!(
                event = "core.git.worktree_missing_on_disk",
                name = name,
                path = %path.display(),
                locked = locked,
            );
            continue;
        }

        let branch = Repository::open_from_worktree(&worktree)
            .ok()
            .and_then(|wt_repo| head_branch(&wt_repo));

        result.push(GitWorktree::new(path, branch, false));
    }

    Ok(result)
}
