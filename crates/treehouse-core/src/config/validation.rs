use crate::config::types::TreehouseConfig;
use crate::errors::ConfigError;

/// Validate the merged configuration.
///
/// Checks values that would otherwise fail late and confusingly at runtime.
/// A missing agent executable only warns: the service is still useful for
/// worktree management without it.
pub fn validate_config(config: &TreehouseConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::InvalidConfiguration {
            message: "server.port must be non-zero".to_string(),
        });
    }

    if config.worktrees.git_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfiguration {
            message: "worktrees.git_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.server.idle_timeout_secs == Some(0) {
        return Err(ConfigError::InvalidConfiguration {
            message: "server.idle_timeout_secs must be greater than 0 when set".to_string(),
        });
    }

    if config.agent.executable.trim().is_empty() {
        return Err(ConfigError::InvalidConfiguration {
            message: "agent.executable cannot be empty".to_string(),
        });
    }

    if config.agent.max_sessions_per_connection == Some(0) {
        return Err(ConfigError::InvalidConfiguration {
            message: "agent.max_sessions_per_connection must be greater than 0 when set"
                .to_string(),
        });
    }

    if let Some(token) = &config.server.auth_token
        && token.trim().is_empty()
    {
        return Err(ConfigError::InvalidConfiguration {
            message: "server.auth_token cannot be blank".to_string(),
        });
    }

    if which::which(&config.agent.executable).is_err() {
        tracing::warn!(
            event = "core.config.agent_executable_not_found",
            executable = %config.agent.executable,
            "Agent executable not found on PATH - session starts will fail"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TreehouseConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = TreehouseConfig::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_zero_git_timeout_rejected() {
        let mut config = TreehouseConfig::default();
        config.worktrees.git_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_executable_rejected() {
        let mut config = TreehouseConfig::default();
        config.agent.executable = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("agent.executable"));
    }

    #[test]
    fn test_blank_auth_token_rejected() {
        let mut config = TreehouseConfig::default();
        config.server.auth_token = Some(String::new());
        assert!(validate_config(&config).is_err());
    }
}
