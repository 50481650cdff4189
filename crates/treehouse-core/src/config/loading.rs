//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.treehouse/config.toml`
//! 3. **Project config** - `./.treehouse/config.toml`
//! 4. **Explicit config** - the file passed with `--config`
//! 5. **Environment** - `TREEHOUSE_AUTH_TOKEN`
//!
//! Layers are merged as TOML tables before deserializing, so a key that is
//! absent from a later file never clobbers an earlier value with a default.
//! `[[projects]]` entries accumulate across layers (deduplicated by path).

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::types::{ProjectEntry, TreehouseConfig};
use crate::config::validation::validate_config;
use crate::errors::ConfigError;

/// Load configuration from the hierarchy of config files.
///
/// Missing user/project files are not errors. A missing explicit file is.
pub fn load_hierarchy(explicit: Option<&Path>) -> Result<TreehouseConfig, ConfigError> {
    let mut layers: Vec<toml::Table> = Vec::new();

    for path in [user_config_path(), project_config_path()].into_iter().flatten() {
        match load_table(&path) {
            Ok(table) => layers.push(table),
            Err(ConfigError::ConfigNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    if let Some(path) = explicit {
        layers.push(load_table(path)?);
    }

    let mut config = merge_layers(layers)?;
    apply_env_overrides(&mut config);
    validate_config(&config)?;

    tracing::info!(
        event = "core.config.load_completed",
        projects = config.projects.len(),
        port = config.server.port,
        auth_enabled = config.server.auth_token.is_some(),
    );

    Ok(config)
}

fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".treehouse").join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(".treehouse").join("config.toml"))
}

fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        Err(e) => return Err(ConfigError::IoError { source: e }),
    };

    content
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::ConfigParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Merge TOML layers (later wins) and deserialize the result.
pub fn merge_layers(layers: Vec<toml::Table>) -> Result<TreehouseConfig, ConfigError> {
    let mut merged = toml::Table::new();
    let mut projects: Vec<toml::Value> = Vec::new();

    for mut layer in layers {
        if let Some(toml::Value::Array(entries)) = layer.remove("projects") {
            projects.extend(entries);
        }
        merge_tables(&mut merged, layer);
    }

    let mut config: TreehouseConfig =
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ConfigParseError {
                path: "<merged>".to_string(),
                message: e.to_string(),
            })?;

    for value in projects {
        let entry: ProjectEntry =
            value
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::ConfigParseError {
                    path: "<projects>".to_string(),
                    message: e.to_string(),
                })?;
        if !config.projects.iter().any(|p| p.path == entry.path) {
            config.projects.push(entry);
        }
    }

    Ok(config)
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(config: &mut TreehouseConfig) {
    if let Ok(token) = std::env::var("TREEHOUSE_AUTH_TOKEN")
        && !token.is_empty()
    {
        config.server.auth_token = Some(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(s: &str) -> toml::Table {
        s.parse().unwrap()
    }

    #[test]
    fn test_merge_later_layer_wins() {
        let config = merge_layers(vec![
            table("[server]\nport = 4000\nbind = \"0.0.0.0\""),
            table("[server]\nport = 5000"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 5000);
        // Absent key in the later layer keeps the earlier value
        assert_eq!(config.server.bind, "0.0.0.0");
    }

    #[test]
    fn test_merge_empty_layers_gives_defaults() {
        let config = merge_layers(vec![]).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.agent.executable, "claude");
        assert!(config.projects.is_empty());
    }

    #[test]
    fn test_merge_projects_accumulate_and_dedupe() {
        let config = merge_layers(vec![
            table("[[projects]]\npath = \"/repo/a\""),
            table("[[projects]]\npath = \"/repo/b\"\n\n[[projects]]\npath = \"/repo/a\""),
        ])
        .unwrap();
        let paths: Vec<_> = config.projects.iter().map(|p| p.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/repo/a"), PathBuf::from("/repo/b")]);
    }

    #[test]
    fn test_merge_type_error_is_parse_error() {
        let result = merge_layers(vec![table("[server]\nport = \"not a number\"")]);
        assert!(matches!(result, Err(ConfigError::ConfigParseError { .. })));
    }

    #[test]
    fn test_load_table_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_table(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_table_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[server\nport = ").unwrap();
        let result = load_table(&path);
        assert!(matches!(result, Err(ConfigError::ConfigParseError { .. })));
    }

    #[test]
    fn test_load_hierarchy_explicit_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_hierarchy(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_hierarchy_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[agent]\nexecutable = \"sh\"\nargs = [\"-c\"]\n\n[worktrees]\ngit_timeout_secs = 5\n",
        )
        .unwrap();

        let config = load_hierarchy(Some(&path)).unwrap();
        assert_eq!(config.agent.executable, "sh");
        assert_eq!(config.agent.args, vec!["-c".to_string()]);
        assert_eq!(config.worktrees.git_timeout_secs, 5);
    }
}
