//! Base project registry
//!
//! Two sources, in this order: `[[projects]]` entries from config, then
//! repositories registered at runtime (persisted to `projects.json`).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard};

use tracing::{info, warn};

use super::errors::ProjectError;
use super::persistence::{PROJECTS_FILE, load_projects, save_projects};
use super::types::BaseProject;
use crate::config::TreehouseConfig;

pub struct ProjectRegistry {
    configured: Vec<BaseProject>,
    registered: RwLock<Vec<BaseProject>>,
    /// `projects.json`; `None` keeps registrations in memory only.
    file: Option<PathBuf>,
    save_lock: Mutex<()>,
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

impl ProjectRegistry {
    pub fn in_memory(configured: Vec<BaseProject>) -> Self {
        Self {
            configured,
            registered: RwLock::new(Vec::new()),
            file: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Build from config entries and the persisted registrations.
    ///
    /// Config entries that are not git repositories are logged and skipped.
    pub fn from_config(config: &TreehouseConfig) -> Self {
        let mut configured: Vec<BaseProject> = Vec::new();
        for entry in &config.projects {
            match BaseProject::new(&entry.path, entry.name.clone(), entry.display_name.clone()) {
                Ok(project) => {
                    if configured.iter().any(|p| p.path == project.path) {
                        continue;
                    }
                    configured.push(project);
                }
                Err(e) => warn!(
                    event = "core.projects.config_entry_skipped",
                    path = %entry.path.display(),
                    error = %e,
                ),
            }
        }

        let file = config.data_dir().join(PROJECTS_FILE);
        let registered: Vec<BaseProject> = load_projects(&file)
            .into_iter()
            .filter(|p| !configured.iter().any(|c| c.path == p.path))
            .collect();

        info!(
            event = "core.projects.registry_loaded",
            configured = configured.len(),
            registered = registered.len(),
        );

        Self {
            configured,
            registered: RwLock::new(registered),
            file: Some(file),
            save_lock: Mutex::new(()),
        }
    }

    fn registered(&self) -> RwLockReadGuard<'_, Vec<BaseProject>> {
        self.registered.read().unwrap_or_else(|e| e.into_inner())
    }

    /// All base projects in registry order.
    pub fn list(&self) -> Vec<BaseProject> {
        let mut all = self.configured.clone();
        all.extend(self.registered().iter().cloned());
        all
    }

    pub fn find_by_path(&self, path: &Path) -> Option<BaseProject> {
        let path = canonical(path);
        self.configured
            .iter()
            .find(|p| p.path == path)
            .cloned()
            .or_else(|| self.registered().iter().find(|p| p.path == path).cloned())
    }

    /// Return the project at `path`, registering it first if unknown.
    pub fn register(&self, path: &Path, name: Option<String>) -> Result<BaseProject, ProjectError> {
        if let Some(existing) = self.find_by_path(path) {
            return Ok(existing);
        }
        self.insert(BaseProject::new(path, name, None)?)
    }

    /// Add a validated project and persist the registrations.
    ///
    /// Returns the known entry instead when the path is already registered.
    pub fn insert(&self, project: BaseProject) -> Result<BaseProject, ProjectError> {
        if let Some(existing) = self.find_by_path(&project.path) {
            return Ok(existing);
        }

        // Held until the file is written, so saves land in snapshot order
        let _save = self.save_lock.lock().unwrap_or_else(|e| e.into_inner());

        let snapshot = {
            let mut registered = self.registered.write().unwrap_or_else(|e| e.into_inner());
            // Lost the race to a concurrent register of the same path
            if let Some(existing) = registered.iter().find(|p| p.path == project.path) {
                return Ok(existing.clone());
            }
            registered.push(project.clone());
            registered.clone()
        };

        if let Some(file) = &self.file {
            save_projects(file, &snapshot)?;
        }

        info!(
            event = "core.projects.registered",
            path = %project.path.display(),
            name = %project.name,
        );
        Ok(project)
    }
}
