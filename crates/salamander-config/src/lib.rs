//! # salamander-config
//!
//! TOML configuration types, loading, and validation for the panel refresh
//! debouncer and the instance task list.
//!
//! Depends only on `salamander-paths`.

mod loading;
mod validation;

pub mod errors;
pub mod types;

pub use errors::ConfigError;
pub use loading::{load_from_paths, load_hierarchy, merge_configs};
pub use types::{InstanceConfig, RefreshConfig, SalamanderConfig, TaskListConfig};
pub use validation::validate_config;

impl SalamanderConfig {
    /// Load configuration from the hierarchy of config files.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}
