//! Startup reconciliation of the store against git.
//!
//! Records whose worktree git no longer lists are dropped. Linked worktrees
//! git knows about but the store does not are adopted as Ready, labelled by
//! their directory name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::errors::WorktreeError;
use super::manager::{WorktreeManager, normalize_base};
use super::types::{WorktreeRecord, WorktreeState};
use super::validation::validate_label;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub dropped: usize,
    pub adopted: usize,
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl WorktreeManager {
    /// Reconcile the records of one base project with git's worktree list.
    pub fn reconcile(&self, base_path: &Path) -> Result<ReconcileReport, WorktreeError> {
        let base = normalize_base(base_path);
        let checkouts = self.git.list_worktrees(&base)?;
        let store = self.store();
        let mut report = ReconcileReport::default();

        let linked: Vec<_> = checkouts.into_iter().filter(|c| !c.is_main).collect();
        let known: HashSet<PathBuf> = linked.iter().map(|c| canonical(&c.path)).collect();

        let mut tracked = HashSet::new();
        for record in store.ready_for(&base) {
            let path = canonical(&record.worktree_path);
            if known.contains(&path) {
                tracked.insert(path);
                continue;
            }
            store.remove(&base, &record.label);
            report.dropped += 1;
            info!(
                event = "core.worktree.reconcile_dropped",
                base_path = %base.display(),
                label = %record.label,
                worktree_path = %record.worktree_path.display(),
            );
        }

        for checkout in linked {
            let path = canonical(&checkout.path);
            if tracked.contains(&path) {
                continue;
            }

            let dir_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let label = match validate_label(&dir_name) {
                Ok(label) => label,
                Err(e) => {
                    warn!(
                        event = "core.worktree.reconcile_skipped",
                        worktree_path = %path.display(),
                        error = %e,
                    );
                    continue;
                }
            };
            if store.get(&base, &label).is_some() {
                warn!(
                    event = "core.worktree.reconcile_label_collision",
                    worktree_path = %path.display(),
                    label = %label,
                );
                continue;
            }

            let branch = checkout.branch.unwrap_or_else(|| "HEAD".to_string());
            store.upsert(WorktreeRecord::new(
                label.clone(),
                branch,
                base.clone(),
                path.clone(),
                WorktreeState::Ready,
            ));
            tracked.insert(path.clone());
            report.adopted += 1;
            info!(
                event = "core.worktree.reconcile_adopted",
                base_path = %base.display(),
                label = %label,
                worktree_path = %path.display(),
            );
        }

        if report != ReconcileReport::default() {
            store.persist()?;
        }

        info!(
            event = "core.worktree.reconcile_completed",
            base_path = %base.display(),
            dropped = report.dropped,
            adopted = report.adopted,
        );
        Ok(report)
    }

    /// Reconcile every base in `bases` plus any base the store has records for.
    ///
    /// A base that cannot be read is logged and left untouched.
    pub fn reconcile_all(&self, bases: &[PathBuf]) -> ReconcileReport {
        let mut all: Vec<PathBuf> = bases.iter().map(|b| normalize_base(b)).collect();
        all.extend(self.store().base_paths());
        all.sort();
        all.dedup();

        let mut total = ReconcileReport::default();
        for base in all {
            match self.reconcile(&base) {
                Ok(report) => {
                    total.dropped += report.dropped;
                    total.adopted += report.adopted;
                }
                Err(e) => warn!(
                    event = "core.worktree.reconcile_failed",
                    base_path = %base.display(),
                    error = %e,
                ),
            }
        }
        total
    }
}
