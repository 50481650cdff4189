//! Worktree Store
//!
//! Authoritative map from `(base path, label)` to [`WorktreeRecord`]. Every
//! method holds the map lock only for a short synchronous section; nothing
//! here awaits. Serialisation of multi-step operations on one label is the
//! lifecycle manager's job (see `locks`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, error};

use super::errors::WorktreeError;
use super::persistence;
use super::types::{WorktreeKey, WorktreeRecord, WorktreeState};

pub struct WorktreeStore {
    records: Mutex<HashMap<WorktreeKey, WorktreeRecord>>,
    /// `worktrees.json`; `None` keeps the store in memory only.
    file: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl WorktreeStore {
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            file: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Open the store backed by `file`, loading its Ready records.
    pub fn load(file: PathBuf) -> Result<Self, WorktreeError> {
        let records = persistence::load_records(&file)?;
        debug!(
            event = "core.worktree.store_loaded",
            file = %file.display(),
            count = records.len(),
        );

        let map = records.into_iter().map(|r| (r.key(), r)).collect();
        Ok(Self {
            records: Mutex::new(map),
            file: Some(file),
            persist_lock: Mutex::new(()),
        })
    }

    fn records(&self) -> MutexGuard<'_, HashMap<WorktreeKey, WorktreeRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically reserve a label by inserting a `Creating` record.
    ///
    /// Fails if the label is held by an active record of the same base, or if
    /// another active record of that base already uses the branch.
    pub fn insert_placeholder(&self, record: WorktreeRecord) -> Result<(), WorktreeError> {
        let mut records = self.records();
        let key = record.key();

        if let Some(existing) = records.get(&key)
            && existing.state.is_active()
        {
            return Err(WorktreeError::LabelTaken {
                label: record.label.clone(),
            });
        }

        if let Some(other) = records.values().find(|r| {
            r.base_path == record.base_path && r.state.is_active() && r.branch == record.branch
        }) {
            return Err(WorktreeError::BranchInUse {
                branch: record.branch.clone(),
                path: other.worktree_path.display().to_string(),
            });
        }

        records.insert(key, record);
        Ok(())
    }

    /// Insert or replace a record unconditionally (reconciliation only).
    pub(crate) fn upsert(&self, record: WorktreeRecord) {
        self.records().insert(record.key(), record);
    }

    /// Move a record from `from` to `to`, returning the updated record.
    ///
    /// `None` when the record is absent or not in `from`.
    pub fn transition(
        &self,
        base_path: &Path,
        label: &str,
        from: WorktreeState,
        to: WorktreeState,
    ) -> Option<WorktreeRecord> {
        let mut records = self.records();
        let record = records.get_mut(&WorktreeKey::new(base_path, label))?;
        if record.state != from {
            return None;
        }
        record.state = to;
        Some(record.clone())
    }

    /// Replace the worktree path of a record (canonicalised after creation).
    pub(crate) fn set_worktree_path(&self, base_path: &Path, label: &str, path: PathBuf) {
        if let Some(record) = self.records().get_mut(&WorktreeKey::new(base_path, label)) {
            record.worktree_path = path;
        }
    }

    pub fn remove(&self, base_path: &Path, label: &str) -> Option<WorktreeRecord> {
        self.records().remove(&WorktreeKey::new(base_path, label))
    }

    pub fn get(&self, base_path: &Path, label: &str) -> Option<WorktreeRecord> {
        self.records()
            .get(&WorktreeKey::new(base_path, label))
            .cloned()
    }

    /// Every record of one base, ordered by label.
    pub fn records_for(&self, base_path: &Path) -> Vec<WorktreeRecord> {
        let mut result: Vec<WorktreeRecord> = self
            .records()
            .values()
            .filter(|r| r.base_path == base_path)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.label.cmp(&b.label));
        result
    }

    /// Ready records of one base, ordered by label.
    pub fn ready_for(&self, base_path: &Path) -> Vec<WorktreeRecord> {
        self.records_for(base_path)
            .into_iter()
            .filter(|r| r.state == WorktreeState::Ready)
            .collect()
    }

    /// Distinct base paths that have at least one record.
    pub fn base_paths(&self) -> Vec<PathBuf> {
        let mut bases: Vec<PathBuf> = self
            .records()
            .values()
            .map(|r| r.base_path.clone())
            .collect();
        bases.sort();
        bases.dedup();
        bases
    }

    /// Write the current Ready records to disk.
    ///
    /// The snapshot is taken under the persist lock, so the last writer
    /// always writes the latest state.
    pub fn persist(&self) -> Result<(), WorktreeError> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut snapshot: Vec<WorktreeRecord> = self
            .records()
            .values()
            .filter(|r| r.state == WorktreeState::Ready)
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| a.key().cmp(&b.key()));

        persistence::save_records(file, &snapshot).inspect_err(|e| {
            error!(
                event = "core.worktree.persist_failed",
                file = %file.display(),
                error = %e,
            );
        })
    }
}
