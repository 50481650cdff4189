//! git CLI wrappers for worktree add/remove.
//!
//! `git worktree add` and `git worktree remove` run through the git CLI so
//! hooks, credential helpers and the user's git config all apply. Every
//! invocation is bounded by a timeout; a timed-out child is killed when its
//! future is dropped.
//!
//! Each function validates arguments, logs structured events, and maps errors consistently.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::errors::GitError;

/// Validate a git argument to prevent injection.
///
/// Rejects values that are empty, start with `-` (option injection), contain
/// control characters, or contain `::` sequences (refspec injection).
pub fn validate_git_arg(value: &str, label: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidArgument {
            label: label.to_string(),
            message: "cannot be empty".to_string(),
        });
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidArgument {
            label: label.to_string(),
            message: format!("'{value}' must not start with '-'"),
        });
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(GitError::InvalidArgument {
            label: label.to_string(),
            message: "contains control characters".to_string(),
        });
    }
    if value.contains("::") {
        return Err(GitError::InvalidArgument {
            label: label.to_string(),
            message: "'::' sequences are not allowed".to_string(),
        });
    }
    Ok(())
}

/// `git worktree add`, creating `branch` with `-b` when `create_branch` is set.
pub async fn worktree_add(
    repo: &Path,
    worktree_path: &Path,
    branch: &str,
    create_branch: bool,
    timeout: Duration,
) -> Result<(), GitError> {
    validate_git_arg(branch, "branch name")?;

    info!(
        event = "core.git.cli.worktree_add_started",
        repo = %repo.display(),
        worktree_path = %worktree_path.display(),
        branch = branch,
        create_branch = create_branch,
    );

    let mut args: Vec<&OsStr> = vec![OsStr::new("worktree"), OsStr::new("add")];
    if create_branch {
        args.push(OsStr::new("-b"));
        args.push(OsStr::new(branch));
        args.push(worktree_path.as_os_str());
    } else {
        args.push(worktree_path.as_os_str());
        args.push(OsStr::new(branch));
    }

    let output = run_git(repo, &args, "worktree add", timeout).await?;

    if output.status.success() {
        info!(
            event = "core.git.cli.worktree_add_completed",
            worktree_path = %worktree_path.display(),
            branch = branch,
        );
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    warn!(
        event = "core.git.cli.worktree_add_failed",
        worktree_path = %worktree_path.display(),
        branch = branch,
        stderr = %stderr,
    );

    if is_branch_in_use_error(&stderr) {
        return Err(GitError::BranchCheckedOut {
            branch: branch.to_string(),
            path: extract_quoted_path(&stderr).unwrap_or_default(),
        });
    }

    Err(GitError::CommandFailed {
        command: "worktree add".to_string(),
        stderr,
    })
}

/// `git worktree remove`, with `--force` when requested.
///
/// Prunes stale administrative entries first so a worktree whose directory
/// was deleted by hand can still be removed.
pub async fn worktree_remove(
    repo: &Path,
    worktree_path: &Path,
    force: bool,
    timeout: Duration,
) -> Result<(), GitError> {
    info!(
        event = "core.git.cli.worktree_remove_started",
        repo = %repo.display(),
        worktree_path = %worktree_path.display(),
        force = force,
    );

    if !worktree_path.exists() {
        let output = run_git(
            repo,
            &[OsStr::new("worktree"), OsStr::new("prune")],
            "worktree prune",
            timeout,
        )
        .await?;
        if output.status.success() {
            info!(
                event = "core.git.cli.worktree_remove_pruned",
                worktree_path = %worktree_path.display(),
            );
            return Ok(());
        }
    }

    let mut args: Vec<&OsStr> = vec![OsStr::new("worktree"), OsStr::new("remove")];
    if force {
        args.push(OsStr::new("--force"));
    }
    args.push(worktree_path.as_os_str());

    let output = run_git(repo, &args, "worktree remove", timeout).await?;

    if output.status.success() {
        info!(
            event = "core.git.cli.worktree_remove_completed",
            worktree_path = %worktree_path.display(),
        );
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    warn!(
        event = "core.git.cli.worktree_remove_failed",
        worktree_path = %worktree_path.display(),
        stderr = %stderr,
    );
    Err(GitError::CommandFailed {
        command: "worktree remove".to_string(),
        stderr,
    })
}

async fn run_git(
    dir: &Path,
    args: &[&OsStr],
    command: &str,
    timeout: Duration,
) -> Result<Output, GitError> {
    debug!(
        event = "core.git.cli.exec",
        dir = %dir.display(),
        command = command,
    );

    let child = Command::new("git")
        .current_dir(dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(GitError::CommandFailed {
            command: command.to_string(),
            stderr: format!("Failed to execute git: {e}"),
        }),
        Err(_) => {
            warn!(
                event = "core.git.cli.timeout",
                dir = %dir.display(),
                command = command,
                secs = timeout.as_secs(),
            );
            Err(GitError::Timeout {
                command: command.to_string(),
                secs: timeout.as_secs(),
            })
        }
    }
}

/// Check whether `git worktree add` stderr says the branch is checked out elsewhere.
fn is_branch_in_use_error(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    ["is already checked out at", "is already used by worktree at"]
        .iter()
        .any(|pattern| lower.contains(pattern))
}

fn extract_quoted_path(stderr: &str) -> Option<String> {
    let start = stderr.rfind(" at '")? + 5;
    let end = stderr[start..].find('\'')? + start;
    Some(stderr[start..end].to_string())
}
