//! Worktree Lifecycle Manager
//!
//! Create and delete are multi-step: reserve the record, run git, settle the
//! record. Each step runs under the per-`(base, label)` lock so a label never
//! sees two operations at once, while different labels proceed in parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::errors::WorktreeError;
use super::locks::KeyedLocks;
use super::persistence::WORKTREES_FILE;
use super::store::WorktreeStore;
use super::types::{WorktreeKey, WorktreeRecord, WorktreeState};
use super::validation::{validate_branch, validate_label};
use crate::config::TreehouseConfig;
use crate::errors::TreehouseError;
use crate::git::{GitBackend, GitCli};

pub struct WorktreeManager {
    store: Arc<WorktreeStore>,
    locks: KeyedLocks,
    pub(super) git: Arc<dyn GitBackend>,
    worktrees_root: PathBuf,
}

/// Canonical form of a base path, or the path as given when it cannot be
/// resolved (lookups of removed repositories still need a key).
pub(crate) fn normalize_base(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn base_dir_name(base: &Path) -> String {
    base.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string())
}

/// Settles an in-flight record when its operation ends without reaching
/// the success path, including when the operation future is dropped.
///
/// A `Creating` placeholder is removed; a `Deleting` record goes back to
/// `Ready`. Declared after the label lock, so it runs while the lock is held.
struct PendingRecord<'a> {
    store: &'a WorktreeStore,
    base: PathBuf,
    label: String,
    state: WorktreeState,
    armed: bool,
}

impl<'a> PendingRecord<'a> {
    fn new(store: &'a WorktreeStore, base: &Path, label: &str, state: WorktreeState) -> Self {
        Self {
            store,
            base: base.to_path_buf(),
            label: label.to_string(),
            state,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let settled = match self.state {
            WorktreeState::Creating => {
                let pending = self
                    .store
                    .get(&self.base, &self.label)
                    .is_some_and(|r| r.state == WorktreeState::Creating);
                pending && self.store.remove(&self.base, &self.label).is_some()
            }
            WorktreeState::Deleting => self
                .store
                .transition(
                    &self.base,
                    &self.label,
                    WorktreeState::Deleting,
                    WorktreeState::Ready,
                )
                .is_some(),
            WorktreeState::Ready | WorktreeState::Deleted => false,
        };
        if settled {
            debug!(
                event = "core.worktree.pending_rolled_back",
                base_path = %self.base.display(),
                label = %self.label,
                state = %self.state,
            );
        }
    }
}

impl WorktreeManager {
    pub fn new(store: Arc<WorktreeStore>, git: Arc<dyn GitBackend>, worktrees_root: PathBuf) -> Self {
        Self {
            store,
            locks: KeyedLocks::default(),
            git,
            worktrees_root,
        }
    }

    /// Manager backed by `worktrees.json` in the data directory and the git CLI.
    pub fn from_config(config: &TreehouseConfig) -> Result<Self, WorktreeError> {
        let store = WorktreeStore::load(config.data_dir().join(WORKTREES_FILE))?;
        let git = GitCli::new(
            Duration::from_secs(config.worktrees.git_timeout_secs),
            config.worktrees.force_remove,
        );
        Ok(Self::new(
            Arc::new(store),
            Arc::new(git),
            config.worktrees_root(),
        ))
    }

    pub fn store(&self) -> &Arc<WorktreeStore> {
        &self.store
    }

    pub fn worktrees_root(&self) -> &Path {
        &self.worktrees_root
    }

    /// Ready records for a base project, ordered by label.
    pub fn list(&self, base_path: &Path) -> Vec<WorktreeRecord> {
        self.store.ready_for(&normalize_base(base_path))
    }

    /// Every record for a base project, in-flight ones included.
    pub fn list_all(&self, base_path: &Path) -> Vec<WorktreeRecord> {
        self.store.records_for(&normalize_base(base_path))
    }

    pub async fn create(
        &self,
        base_path: &Path,
        branch: &str,
        label: &str,
    ) -> Result<WorktreeRecord, WorktreeError> {
        let label = validate_label(label)?;
        let branch = validate_branch(branch)?;

        info!(
            event = "core.worktree.create_started",
            base_path = %base_path.display(),
            branch = %branch,
            label = %label,
        );

        let base = std::fs::canonicalize(base_path).map_err(|_| {
            WorktreeError::BaseProjectNotFound {
                path: base_path.display().to_string(),
            }
        })?;

        let key = WorktreeKey::new(&base, &label);
        let Some(_guard) = self.locks.try_acquire(&key) else {
            warn!(
                event = "core.worktree.create_rejected_busy",
                base_path = %base.display(),
                label = %label,
            );
            return Err(WorktreeError::OperationInProgress { label });
        };

        if let Some(existing) = self.store.get(&base, &label)
            && existing.state.is_active()
        {
            return Err(WorktreeError::LabelTaken { label });
        }

        // The store only knows worktrees created through us; git knows all
        // of them, including the main checkout.
        let checkouts = self.git.list_worktrees(&base)?;
        if let Some(checkout) = checkouts
            .iter()
            .find(|c| c.branch.as_deref() == Some(branch.as_str()))
        {
            return Err(WorktreeError::BranchInUse {
                branch,
                path: checkout.path.display().to_string(),
            });
        }

        let worktree_path = self
            .worktrees_root
            .join(base_dir_name(&base))
            .join(&label);
        if worktree_path.exists() {
            return Err(WorktreeError::PathExists {
                path: worktree_path.display().to_string(),
            });
        }

        self.store.insert_placeholder(WorktreeRecord::new(
            label.clone(),
            branch.clone(),
            base.clone(),
            worktree_path.clone(),
            WorktreeState::Creating,
        ))?;
        let pending = PendingRecord::new(&self.store, &base, &label, WorktreeState::Creating);

        if let Err(e) = self.git.add_worktree(&base, &worktree_path, &branch).await {
            error!(
                event = "core.worktree.create_failed",
                base_path = %base.display(),
                label = %label,
                error_code = e.error_code(),
                error = %e,
            );
            return Err(e.into());
        }

        if let Ok(canonical) = std::fs::canonicalize(&worktree_path) {
            self.store.set_worktree_path(&base, &label, canonical);
        }

        let record = self
            .store
            .transition(&base, &label, WorktreeState::Creating, WorktreeState::Ready)
            .ok_or_else(|| WorktreeError::PersistenceFailed {
                message: format!("record '{label}' vanished while creating"),
            })?;
        pending.disarm();

        // The worktree exists on disk; startup reconciliation adopts it if
        // this write is lost.
        if let Err(e) = self.store.persist() {
            warn!(
                event = "core.worktree.create_persist_failed",
                label = %label,
                error = %e,
            );
        }

        info!(
            event = "core.worktree.create_completed",
            base_path = %base.display(),
            label = %label,
            branch = %branch,
            worktree_path = %record.worktree_path.display(),
        );
        Ok(record)
    }

    /// Remove a worktree. Waits for any in-flight operation on the same label.
    pub async fn delete(
        &self,
        base_path: &Path,
        label: &str,
    ) -> Result<WorktreeRecord, WorktreeError> {
        let base = normalize_base(base_path);
        let label = label.trim().to_string();

        info!(
            event = "core.worktree.delete_started",
            base_path = %base.display(),
            label = %label,
        );

        let key = WorktreeKey::new(&base, &label);
        let _guard = self.locks.acquire(&key).await;

        // Re-check under the lock: a concurrent create may have rolled back
        let Some(record) = self.store.get(&base, &label) else {
            return Err(WorktreeError::NotFound { label });
        };
        if record.state != WorktreeState::Ready {
            return Err(WorktreeError::OperationInProgress { label });
        }

        self.store
            .transition(&base, &label, WorktreeState::Ready, WorktreeState::Deleting);
        let pending = PendingRecord::new(&self.store, &base, &label, WorktreeState::Deleting);

        if let Err(e) = self.git.remove_worktree(&base, &record.worktree_path).await {
            error!(
                event = "core.worktree.delete_failed",
                base_path = %base.display(),
                label = %label,
                error_code = e.error_code(),
                error = %e,
            );
            return Err(e.into());
        }

        let mut removed = self.store.remove(&base, &label).unwrap_or(record);
        removed.state = WorktreeState::Deleted;
        pending.disarm();

        if let Err(e) = self.store.persist() {
            warn!(
                event = "core.worktree.delete_persist_failed",
                label = %label,
                error = %e,
            );
        }

        info!(
            event = "core.worktree.delete_completed",
            base_path = %base.display(),
            label = %label,
        );
        Ok(removed)
    }
}
