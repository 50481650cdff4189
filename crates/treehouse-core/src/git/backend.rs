use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::errors::GitError;
use super::types::GitWorktree;
use super::{cli, operations};

/// Access to the worktree operations of a repository.
///
/// The lifecycle manager only talks to git through this trait so it can be
/// driven by a scripted backend in tests.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Add a worktree for `branch` at `worktree_path`, creating the branch
    /// when it does not exist locally.
    async fn add_worktree(
        &self,
        repo: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<(), GitError>;

    async fn remove_worktree(&self, repo: &Path, worktree_path: &Path) -> Result<(), GitError>;

    /// Every checkout of `repo`, main working directory included.
    fn list_worktrees(&self, repo: &Path) -> Result<Vec<GitWorktree>, GitError>;
}

/// Production backend: `git` CLI for mutations, libgit2 for reads.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
    force_remove: bool,
}

impl GitCli {
    pub fn new(timeout: Duration, force_remove: bool) -> Self {
        Self {
            timeout,
            force_remove,
        }
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn add_worktree(
        &self,
        repo: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<(), GitError> {
        let create_branch = !operations::branch_exists(repo, branch)?;
        debug!(
            event = "core.git.backend.branch_checked",
            branch = branch,
            create_branch = create_branch,
        );

        if let Some(parent) = worktree_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        cli::worktree_add(repo, worktree_path, branch, create_branch, self.timeout).await
    }

    async fn remove_worktree(&self, repo: &Path, worktree_path: &Path) -> Result<(), GitError> {
        cli::worktree_remove(repo, worktree_path, self.force_remove, self.timeout).await
    }

    fn list_worktrees(&self, repo: &Path) -> Result<Vec<GitWorktree>, GitError> {
        operations::list_worktrees(repo)
    }
}

/// Test fixtures for code that depends on [`GitBackend`].
///
/// Public so treehouse-server's integration tests can use them.
#[doc(hidden)]
pub mod test_helpers {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::GitBackend;
    use crate::git::errors::GitError;
    use crate::git::types::GitWorktree;

    #[derive(Default)]
    struct ScriptedState {
        add_delay: Duration,
        remove_delay: Duration,
        fail_next_add: Option<String>,
        fail_next_remove: Option<String>,
        time_out_next_add: bool,
        linked: HashMap<PathBuf, Vec<GitWorktree>>,
        calls: Vec<String>,
    }

    /// In-memory git backend with scriptable failures and delays.
    ///
    /// Every repository reports a main checkout on `main` plus whatever
    /// worktrees were added through it or via [`ScriptedGit::add_untracked`].
    #[derive(Default)]
    pub struct ScriptedGit {
        state: Mutex<ScriptedState>,
    }

    impl ScriptedGit {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delay every `add_worktree` call, to widen race windows in tests.
        pub fn with_add_delay(self, delay: Duration) -> Self {
            self.lock().add_delay = delay;
            self
        }

        pub fn with_remove_delay(self, delay: Duration) -> Self {
            self.lock().remove_delay = delay;
            self
        }

        pub fn fail_next_add(&self, stderr: &str) {
            self.lock().fail_next_add = Some(stderr.to_string());
        }

        pub fn fail_next_remove(&self, stderr: &str) {
            self.lock().fail_next_remove = Some(stderr.to_string());
        }

        pub fn time_out_next_add(&self) {
            self.lock().time_out_next_add = true;
        }

        /// Register a worktree git knows about but the store does not.
        pub fn add_untracked(&self, repo: &Path, path: &Path, branch: &str) {
            self.lock()
                .linked
                .entry(repo.to_path_buf())
                .or_default()
                .push(GitWorktree::new(
                    path.to_path_buf(),
                    Some(branch.to_string()),
                    false,
                ));
        }

        /// Forget a worktree, as if someone removed it behind our back.
        pub fn forget(&self, repo: &Path, path: &Path) {
            if let Some(list) = self.lock().linked.get_mut(repo) {
                list.retain(|wt| wt.path != path);
            }
        }

        /// Calls received so far, formatted as `"add <branch>"` / `"remove <path>"`.
        pub fn calls(&self) -> Vec<String> {
            self.lock().calls.clone()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    #[async_trait]
    impl GitBackend for ScriptedGit {
        async fn add_worktree(
            &self,
            repo: &Path,
            worktree_path: &Path,
            branch: &str,
        ) -> Result<(), GitError> {
            let delay = {
                let mut state = self.lock();
                state.calls.push(format!("add {branch}"));
                state.add_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.lock();
            if state.time_out_next_add {
                state.time_out_next_add = false;
                return Err(GitError::Timeout {
                    command: "worktree add".to_string(),
                    secs: 60,
                });
            }
            if let Some(stderr) = state.fail_next_add.take() {
                return Err(GitError::CommandFailed {
                    command: "worktree add".to_string(),
                    stderr,
                });
            }
            state
                .linked
                .entry(repo.to_path_buf())
                .or_default()
                .push(GitWorktree::new(
                    worktree_path.to_path_buf(),
                    Some(branch.to_string()),
                    false,
                ));
            Ok(())
        }

        async fn remove_worktree(&self, repo: &Path, worktree_path: &Path) -> Result<(), GitError> {
            let delay = {
                let mut state = self.lock();
                state
                    .calls
                    .push(format!("remove {}", worktree_path.display()));
                state.remove_delay
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut state = self.lock();
            if let Some(stderr) = state.fail_next_remove.take() {
                return Err(GitError::CommandFailed {
                    command: "worktree remove".to_string(),
                    stderr,
                });
            }
            if let Some(list) = state.linked.get_mut(repo) {
                list.retain(|wt| wt.path != worktree_path);
            }
            Ok(())
        }

        fn list_worktrees(&self, repo: &Path) -> Result<Vec<GitWorktree>, GitError> {
            let state = self.lock();
            let mut result = vec![GitWorktree::new(
                repo.to_path_buf(),
                Some("main".to_string()),
                true,
            )];
            if let Some(linked) = state.linked.get(repo) {
                result.extend(linked.iter().cloned());
            }
            Ok(result)
        }
    }

    /// Initialise a git repository on `main` with one commit.
    pub fn init_repo(path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)?;
        let run = |args: &[&str]| -> std::io::Result<()> {
            let output = Command::new("git").args(args).current_dir(path).output()?;
            if output.status.success() {
                Ok(())
            } else {
                Err(std::io::Error::other(format!(
                    "git {:?} failed: {}",
                    args,
                    String::from_utf8_lossy(&output.stderr)
                )))
            }
        };
        run(&["init", "-b", "main"])?;
        run(&["config", "user.email", "test@example.com"])?;
        run(&["config", "user.name", "Test"])?;
        std::fs::write(path.join("README.md"), "hello\n")?;
        run(&["add", "."])?;
        run(&["commit", "-m", "initial"])?;
        Ok(())
    }
}
