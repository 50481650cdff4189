use std::fs;
use std::path::Path;

use super::errors::ProjectError;
use super::types::{BaseProject, ProjectsData};

pub const PROJECTS_FILE: &str = "projects.json";

/// Load registered projects.
///
/// Returns an empty list if the file doesn't exist or is corrupted (with error logged).
pub fn load_projects(file: &Path) -> Vec<BaseProject> {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::error!(
                event = "core.projects.load_failed",
                path = %file.display(),
                error = %e
            );
            return Vec::new();
        }
    };

    match serde_json::from_str::<ProjectsData>(&content) {
        Ok(data) => data.projects,
        Err(e) => {
            // ERROR (not warn): the file exists but registrations are lost
            tracing::error!(
                event = "core.projects.json_parse_failed",
                path = %file.display(),
                error = %e,
            );
            Vec::new()
        }
    }
}

pub fn save_projects(file: &Path, projects: &[BaseProject]) -> Result<(), ProjectError> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|e| ProjectError::SaveFailed {
            message: format!("Failed to create directory ({}): {}", parent.display(), e),
        })?;
    }

    let data = ProjectsData {
        projects: projects.to_vec(),
    };
    let json = serde_json::to_string_pretty(&data).map_err(|e| ProjectError::SaveFailed {
        message: format!("Failed to serialize projects: {}", e),
    })?;

    let temp_file = file.with_extension("json.tmp");
    let write = fs::write(&temp_file, json).and_then(|_| fs::rename(&temp_file, file));
    if let Err(e) = write {
        let _ = fs::remove_file(&temp_file);
        return Err(ProjectError::SaveFailed {
            message: format!("Failed to write projects file ({}): {}", file.display(), e),
        });
    }

    tracing::info!(
        event = "core.projects.saved",
        path = %file.display(),
        count = projects.len()
    );
    Ok(())
}
