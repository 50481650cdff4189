//! # Configuration System
//!
//! Hierarchical TOML configuration for treehouse.
//!
//! ## Configuration Hierarchy
//!
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.treehouse/config.toml`
//! 3. **Project config** - `./.treehouse/config.toml`
//! 4. **Explicit config** - `--config <path>`
//! 5. **CLI arguments** - applied by the binary (highest priority)
//!
//! ## Loading Configuration
//!
//! ```rust,no_run
//! use treehouse_core::config::TreehouseConfig;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TreehouseConfig::load_hierarchy(None)?;
//!     println!("listening on {}:{}", config.server.bind, config.server.port);
//!     Ok(())
//! }
//! ```

pub mod defaults;
pub mod loading;
pub mod types;
pub mod validation;

pub use types::{
    AgentConfig, ProjectEntry, ServerConfig, StorageConfig, TreehouseConfig, WorktreesConfig,
};
pub use validation::validate_config;

impl TreehouseConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy(
        explicit: Option<&std::path::Path>,
    ) -> Result<Self, crate::errors::ConfigError> {
        loading::load_hierarchy(explicit)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::errors::ConfigError> {
        validation::validate_config(self)
    }
}
