//! Project Aggregator
//!
//! The projects list is a read model: every call re-derives it from the
//! registry and the worktree store, so there is no cache to go stale.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::registry::ProjectRegistry;
use super::types::{BaseProject, Project};
use crate::worktrees::{WorktreeManager, WorktreeRecord};

fn base_entry(base: &BaseProject) -> Project {
    Project {
        name: base.name.clone(),
        display_name: base.display_name.clone(),
        path: base.path.clone(),
        is_worktree: false,
        base_project_name: None,
        branch: None,
    }
}

fn worktree_entry(base: &BaseProject, record: &WorktreeRecord) -> Project {
    Project {
        name: format!("{}-{}", base.name, record.label),
        display_name: format!("{} - {}", base.display_name, record.label),
        path: record.worktree_path.clone(),
        is_worktree: true,
        base_project_name: Some(base.name.clone()),
        branch: Some(record.branch.clone()),
    }
}

/// Each base project followed by its Ready worktrees in label order.
///
/// Entries are deduplicated by identity (base path, plus label for
/// worktrees). Names stay unique: an entry whose derived name is already
/// taken by a different project gets a numeric suffix.
pub fn list_projects(registry: &ProjectRegistry, manager: &WorktreeManager) -> Vec<Project> {
    let mut seen: HashSet<(PathBuf, Option<String>)> = HashSet::new();
    let mut names: HashSet<String> = HashSet::new();
    let mut projects = Vec::new();

    let mut push = |identity: (PathBuf, Option<String>), mut project: Project| {
        if !seen.insert(identity) {
            return;
        }
        if !names.insert(project.name.clone()) {
            let taken = project.name.clone();
            let mut n = 2;
            while !names.insert(format!("{taken}-{n}")) {
                n += 1;
            }
            project.name = format!("{taken}-{n}");
            warn!(
                event = "core.projects.name_collision",
                name = %taken,
                renamed = %project.name,
                path = %project.path.display(),
            );
        }
        projects.push(project);
    };

    for base in registry.list() {
        push((base.path.clone(), None), base_entry(&base));
        for record in manager.list(&base.path) {
            push(
                (base.path.clone(), Some(record.label.clone())),
                worktree_entry(&base, &record),
            );
        }
    }

    debug!(event = "core.projects.list_completed", count = projects.len());
    projects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_helpers::ScriptedGit;
    use crate::worktrees::WorktreeStore;
    use std::path::Path;
    use std::sync::Arc;

    fn setup() -> (tempfile::TempDir, PathBuf, ProjectRegistry, WorktreeManager) {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().join("agendamente");
        std::fs::create_dir_all(&base).unwrap();
        let base = base.canonicalize().unwrap();

        let registry = ProjectRegistry::in_memory(vec![BaseProject::new_unchecked(
            base.clone(),
            "agendamente".to_string(),
            "agendamente".to_string(),
        )]);
        let manager = WorktreeManager::new(
            Arc::new(WorktreeStore::in_memory()),
            Arc::new(ScriptedGit::new()),
            dir.path().join("worktrees"),
        );
        (dir, base, registry, manager)
    }

    fn display_names(projects: &[Project]) -> Vec<&str> {
        projects.iter().map(|p| p.display_name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_lists_base_then_worktrees_by_label() {
        let (_dir, base, registry, manager) = setup();
        manager.create(&base, "feature/v3", "V3").await.unwrap();
        manager.create(&base, "feature/v2", "V2").await.unwrap();

        let projects = list_projects(&registry, &manager);
        assert_eq!(
            display_names(&projects),
            vec!["agendamente", "agendamente - V2", "agendamente - V3"]
        );

        let v2 = &projects[1];
        assert_eq!(v2.name, "agendamente-V2");
        assert!(v2.is_worktree);
        assert_eq!(v2.base_project_name.as_deref(), Some("agendamente"));
        assert_eq!(v2.branch.as_deref(), Some("feature/v2"));
    }

    #[tokio::test]
    async fn test_read_is_idempotent() {
        let (_dir, base, registry, manager) = setup();
        manager.create(&base, "feature/v2", "V2").await.unwrap();

        let first = list_projects(&registry, &manager);
        let second = list_projects(&registry, &manager);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_no_duplicates_after_create_and_delete() {
        let (_dir, base, registry, manager) = setup();
        manager.create(&base, "feature/v2", "V2").await.unwrap();

        let projects = list_projects(&registry, &manager);
        let v2_count = projects
            .iter()
            .filter(|p| p.display_name == "agendamente - V2")
            .count();
        assert_eq!(v2_count, 1);

        manager.delete(&base, "V2").await.unwrap();
        let projects = list_projects(&registry, &manager);
        assert!(projects.iter().all(|p| !p.is_worktree));
    }

    #[test]
    fn test_same_name_bases_are_both_listed() {
        let registry = ProjectRegistry::in_memory(vec![
            BaseProject::new_unchecked(
                PathBuf::from("/a/app"),
                "app".to_string(),
                "app".to_string(),
            ),
            BaseProject::new_unchecked(
                PathBuf::from("/b/app"),
                "app".to_string(),
                "app (b)".to_string(),
            ),
        ]);
        let manager = WorktreeManager::new(
            Arc::new(WorktreeStore::in_memory()),
            Arc::new(ScriptedGit::new()),
            Path::new("/wt").to_path_buf(),
        );

        let projects = list_projects(&registry, &manager);
        assert_eq!(display_names(&projects), vec!["app", "app (b)"]);
        assert_eq!(projects[0].name, "app");
        assert_eq!(projects[1].name, "app-2");
    }

    #[tokio::test]
    async fn test_worktree_name_colliding_with_base_is_kept() {
        let dir = tempfile::TempDir::new().unwrap();
        let app_v2 = dir.path().join("app-V2");
        let app = dir.path().join("app");
        std::fs::create_dir_all(&app_v2).unwrap();
        std::fs::create_dir_all(&app).unwrap();
        let app_v2 = app_v2.canonicalize().unwrap();
        let app = app.canonicalize().unwrap();

        let registry = ProjectRegistry::in_memory(vec![
            BaseProject::new_unchecked(app_v2, "app-V2".to_string(), "app-V2".to_string()),
            BaseProject::new_unchecked(app.clone(), "app".to_string(), "app".to_string()),
        ]);
        let manager = WorktreeManager::new(
            Arc::new(WorktreeStore::in_memory()),
            Arc::new(ScriptedGit::new()),
            dir.path().join("worktrees"),
        );
        manager.create(&app, "feature/v2", "V2").await.unwrap();

        let projects = list_projects(&registry, &manager);
        assert_eq!(
            display_names(&projects),
            vec!["app-V2", "app", "app - V2"]
        );
        let worktree = &projects[2];
        assert!(worktree.is_worktree);
        assert_eq!(worktree.name, "app-V2-2");

        let mut names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), projects.len());
    }
}
