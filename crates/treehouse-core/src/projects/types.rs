use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::errors::ProjectError;
use crate::git::is_git_repo;

/// A base repository worktrees are derived from.
///
/// Stored with a canonical path so lookups from different spellings of the
/// same directory agree. Use [`BaseProject::new`] for user input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaseProject {
    pub path: PathBuf,
    pub name: String,
    pub display_name: String,
}

impl BaseProject {
    /// Create a validated base project.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Path cannot be canonicalized (doesn't exist or is inaccessible)
    /// - Path is not a directory
    /// - Path is not a git repository
    pub fn new(
        path: &Path,
        name: Option<String>,
        display_name: Option<String>,
    ) -> Result<Self, ProjectError> {
        let canonical = path
            .canonicalize()
            .map_err(|source| ProjectError::PathNotFound {
                path: path.display().to_string(),
                source,
            })?;

        if !canonical.is_dir() {
            return Err(ProjectError::NotADirectory {
                path: canonical.display().to_string(),
            });
        }

        if !is_git_repo(&canonical)? {
            return Err(ProjectError::NotAGitRepo {
                path: canonical.display().to_string(),
            });
        }

        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| derive_name(&canonical));
        let display_name = display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name.clone());

        Ok(Self {
            path: canonical,
            name,
            display_name,
        })
    }

    /// Create without validation (deserialization and tests).
    pub fn new_unchecked(path: PathBuf, name: String, display_name: String) -> Self {
        Self {
            path,
            name,
            display_name,
        }
    }
}

/// Directory name of a path, falling back to the full path.
pub fn derive_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .unwrap_or_else(|| path.display().to_string())
}

/// One entry of the aggregated projects list. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub display_name: String,
    pub path: PathBuf,
    pub is_worktree: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Stored projects data (serialization DTO for `projects.json`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectsData {
    pub projects: Vec<BaseProject>,
}
