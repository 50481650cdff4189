//! Worktree record persistence
//!
//! `worktrees.json` holds the Ready records only. Writes go to a temp file
//! and are renamed into place so a crash never leaves a truncated file.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::errors::WorktreeError;
use super::types::{WorktreeRecord, WorktreeState, WorktreesData};

pub const WORKTREES_FILE: &str = "worktrees.json";

fn cleanup_temp_file(temp_file: &Path, original_error: &std::io::Error) {
    if let Err(cleanup_err) = fs::remove_file(temp_file) {
        warn!(
            event = "core.worktree.temp_file_cleanup_failed",
            temp_file = %temp_file.display(),
            original_error = %original_error,
            cleanup_error = %cleanup_err,
        );
    }
}

pub fn save_records(file: &Path, records: &[WorktreeRecord]) -> Result<(), WorktreeError> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = WorktreesData {
        worktrees: records.to_vec(),
    };
    let json = serde_json::to_string_pretty(&data).map_err(|e| WorktreeError::PersistenceFailed {
        message: format!("serialization failed: {e}"),
    })?;

    let temp_file = file.with_extension("json.tmp");

    if let Err(e) = fs::write(&temp_file, &json) {
        cleanup_temp_file(&temp_file, &e);
        return Err(WorktreeError::PersistenceFailed {
            message: format!("failed to write {}: {e}", temp_file.display()),
        });
    }

    if let Err(e) = fs::rename(&temp_file, file) {
        cleanup_temp_file(&temp_file, &e);
        return Err(WorktreeError::PersistenceFailed {
            message: format!("failed to rename into {}: {e}", file.display()),
        });
    }

    debug!(
        event = "core.worktree.records_saved",
        file = %file.display(),
        count = records.len(),
    );
    Ok(())
}

/// Load persisted records. A missing file is an empty store; a corrupt file
/// is logged and treated as empty, since reconciliation re-adopts whatever
/// worktrees git still knows about.
pub fn load_records(file: &Path) -> Result<Vec<WorktreeRecord>, WorktreeError> {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(WorktreeError::IoError { source: e }),
    };

    match serde_json::from_str::<WorktreesData>(&content) {
        Ok(data) => Ok(data
            .worktrees
            .into_iter()
            .filter(|r| r.state == WorktreeState::Ready)
            .collect()),
        Err(e) => {
            warn!(
                event = "core.worktree.records_load_failed",
                file = %file.display(),
                error = %e,
            );
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(label: &str, state: WorktreeState) -> WorktreeRecord {
        WorktreeRecord::new(
            label.to_string(),
            format!("feature/{label}"),
            PathBuf::from("/repo"),
            PathBuf::from(format!("/wt/repo/{label}")),
            state,
        )
    }

    #[test]
    fn test_save_and_load_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("nested").join(WORKTREES_FILE);

        save_records(&file, &[record("V2", WorktreeState::Ready)]).unwrap();
        assert!(!file.with_extension("json.tmp").exists());

        let loaded = load_records(&file).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, "V2");
    }

    #[test]
    fn test_load_skips_non_ready_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join(WORKTREES_FILE);
        save_records(
            &file,
            &[
                record("a", WorktreeState::Ready),
                record("b", WorktreeState::Creating),
            ],
        )
        .unwrap();

        let loaded = load_records(&file).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label, "a");
    }

    #[test]
    fn test_load_missing_or_corrupt_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join(WORKTREES_FILE);
        assert!(load_records(&file).unwrap().is_empty());

        fs::write(&file, "{not json").unwrap();
        assert!(load_records(&file).unwrap().is_empty());
    }
}
