use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle of a worktree record.
///
/// `Creating` and `Deleting` are held only while a git command runs under
/// the per-label lock; only `Ready` records are persisted and listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeState {
    Creating,
    Ready,
    Deleting,
    Deleted,
}

impl WorktreeState {
    /// Whether a record in this state reserves its label.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            WorktreeState::Creating | WorktreeState::Ready | WorktreeState::Deleting
        )
    }
}

impl std::fmt::Display for WorktreeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorktreeState::Creating => "creating",
            WorktreeState::Ready => "ready",
            WorktreeState::Deleting => "deleting",
            WorktreeState::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeRecord {
    pub label: String,
    pub branch: String,
    /// Canonical path of the base repository.
    pub base_path: PathBuf,
    pub worktree_path: PathBuf,
    pub state: WorktreeState,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl WorktreeRecord {
    pub fn new(
        label: String,
        branch: String,
        base_path: PathBuf,
        worktree_path: PathBuf,
        state: WorktreeState,
    ) -> Self {
        Self {
            label,
            branch,
            base_path,
            worktree_path,
            state,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn key(&self) -> WorktreeKey {
        WorktreeKey::new(&self.base_path, &self.label)
    }
}

/// Identity of a worktree: its base repository plus its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorktreeKey {
    pub base_path: PathBuf,
    pub label: String,
}

impl WorktreeKey {
    pub fn new(base_path: &Path, label: &str) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            label: label.to_string(),
        }
    }
}

/// On-disk shape of `worktrees.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreesData {
    pub worktrees: Vec<WorktreeRecord>,
}
