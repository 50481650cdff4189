use std::error::Error;

/// Coarse classification shared by every error in the workspace.
///
/// The transport layer maps this to HTTP status codes and to streamed
/// `error` events, so each module only has to classify its own variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ExternalTool,
    InvalidInput,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ExternalTool => "external_tool_error",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Base trait for all application errors
pub trait TreehouseError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Taxonomy bucket used for status mapping
    fn kind(&self) -> ErrorKind;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::InvalidInput
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found at '{path}'")]
    ConfigNotFound { path: String },

    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParseError { path: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("IO error reading config: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl TreehouseError for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::ConfigNotFound { .. } => "CONFIG_NOT_FOUND",
            ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::ConfigNotFound { .. } => ErrorKind::NotFound,
            ConfigError::ConfigParseError { .. } | ConfigError::InvalidConfiguration { .. } => {
                ErrorKind::InvalidInput
            }
            ConfigError::IoError { .. } => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parse_error() {
        let error = ConfigError::ConfigParseError {
            path: "/tmp/config.toml".to_string(),
            message: "invalid TOML syntax".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to parse config file '/tmp/config.toml': invalid TOML syntax"
        );
        assert_eq!(error.error_code(), "CONFIG_PARSE_ERROR");
        assert!(error.is_user_error());
    }

    #[test]
    fn test_config_io_error_is_not_user_error() {
        let error = ConfigError::IoError {
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(!error.is_user_error());
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::ExternalTool.as_str(), "external_tool_error");
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
    }
}
