//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in the following order (later sources override earlier ones):
//! 1. **Hardcoded defaults** - Built-in fallback values
//! 2. **User config** - `~/.salamander/config.toml`
//! 3. **Project config** - `./.salamander/config.toml`

use std::fs;
use std::path::Path;

use salamander_paths::SalamanderPaths;
use tracing::debug;

use crate::errors::ConfigError;
use crate::types::{InstanceConfig, RefreshConfig, SalamanderConfig, TaskListConfig};
use crate::validation::validate_config;

/// Load configuration from the hierarchy of config files.
///
/// Missing config files are not errors. Parse and validation failures are.
pub fn load_hierarchy() -> Result<SalamanderConfig, ConfigError> {
    let paths = SalamanderPaths::resolve().map_err(|e| ConfigError::PathResolution {
        message: e.to_string(),
    })?;
    let project_root = std::env::current_dir()?;
    load_from_paths(
        &paths.user_config(),
        &SalamanderPaths::project_config(&project_root),
    )
}

/// Load and merge the user and project config files at explicit locations.
pub fn load_from_paths(user: &Path, project: &Path) -> Result<SalamanderConfig, ConfigError> {
    let mut config = SalamanderConfig::default();

    for path in [user, project] {
        if let Some(file_config) = load_config_file(path)? {
            config = merge_configs(config, file_config);
        }
    }

    validate_config(&config)?;
    Ok(config)
}

/// Load a configuration file. Returns `Ok(None)` when the file does not exist.
fn load_config_file(path: &Path) -> Result<Option<SalamanderConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(event = "config.load.file_missing", path = %path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let config: SalamanderConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ConfigParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    debug!(event = "config.load.file_loaded", path = %path.display());
    Ok(Some(config))
}

/// Merge two configurations, with `override_config` taking precedence.
///
/// Override values replace base values only where they are set.
pub fn merge_configs(
    base: SalamanderConfig,
    override_config: SalamanderConfig,
) -> SalamanderConfig {
    let b = base;
    let o = override_config;
    SalamanderConfig {
        refresh: RefreshConfig {
            min_inactive_delay_ms: o
                .refresh
                .min_inactive_delay_ms
                .or(b.refresh.min_inactive_delay_ms),
            max_inactive_delay_ms: o
                .refresh
                .max_inactive_delay_ms
                .or(b.refresh.max_inactive_delay_ms),
            refresh_dir_ex_fast_ms: o
                .refresh
                .refresh_dir_ex_fast_ms
                .or(b.refresh.refresh_dir_ex_fast_ms),
            refresh_dir_ex_slow_ms: o
                .refresh
                .refresh_dir_ex_slow_ms
                .or(b.refresh.refresh_dir_ex_slow_ms),
            sm_end_notify_ms: o.refresh.sm_end_notify_ms.or(b.refresh.sm_end_notify_ms),
            icon_overlay_period_ms: o
                .refresh
                .icon_overlay_period_ms
                .or(b.refresh.icon_overlay_period_ms),
        },
        tasklist: TaskListConfig {
            todo_timeout_ms: o.tasklist.todo_timeout_ms.or(b.tasklist.todo_timeout_ms),
            max_items: o.tasklist.max_items.or(b.tasklist.max_items),
            heartbeat_interval_ms: o
                .tasklist
                .heartbeat_interval_ms
                .or(b.tasklist.heartbeat_interval_ms),
            missed_heartbeats: o
                .tasklist
                .missed_heartbeats
                .or(b.tasklist.missed_heartbeats),
            fire_lock_timeout_ms: o
                .tasklist
                .fire_lock_timeout_ms
                .or(b.tasklist.fire_lock_timeout_ms),
            fire_reply_timeout_ms: o
                .tasklist
                .fire_reply_timeout_ms
                .or(b.tasklist.fire_reply_timeout_ms),
        },
        instance: InstanceConfig {
            only_one_instance: o
                .instance
                .only_one_instance
                .or(b.instance.only_one_instance),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from_paths(
            &dir.path().join("user.toml"),
            &dir.path().join("project.toml"),
        )
        .unwrap();
        assert_eq!(config, SalamanderConfig::default());
    }

    #[test]
    fn test_project_overrides_user() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        let project = dir.path().join("project.toml");
        fs::write(
            &user,
            "[refresh]\nmin_inactive_delay_ms = 1000\nmax_inactive_delay_ms = 4000\n",
        )
        .unwrap();
        fs::write(&project, "[refresh]\nmin_inactive_delay_ms = 1500\n").unwrap();

        let config = load_from_paths(&user, &project).unwrap();
        assert_eq!(
            config.refresh.min_inactive_delay(),
            Duration::from_millis(1500)
        );
        // Not set in project config, inherited from user config
        assert_eq!(
            config.refresh.max_inactive_delay(),
            Duration::from_millis(4000)
        );
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        fs::write(&user, "[refresh\nbroken").unwrap();

        let err = load_from_paths(&user, &dir.path().join("none.toml")).unwrap_err();
        match err {
            ConfigError::ConfigParseError { path, .. } => assert!(path.ends_with("user.toml")),
            other => panic!("expected ConfigParseError, got: {}", other),
        }
    }

    #[test]
    fn test_invalid_merged_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        fs::write(&user, "[tasklist]\nmax_items = 0\n").unwrap();

        let result = load_from_paths(&user, &dir.path().join("none.toml"));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_load_hierarchy_reads_home() {
        let home = tempfile::tempdir().unwrap();
        let base = home.path().join(".salamander");
        fs::create_dir_all(&base).unwrap();
        fs::write(
            base.join("config.toml"),
            "[instance]\nonly_one_instance = false\n",
        )
        .unwrap();

        temp_env::with_var("HOME", Some(home.path()), || {
            let config = load_hierarchy().unwrap();
            assert!(!config.instance.only_one_instance());
        });
    }

    #[test]
    fn test_merge_keeps_base_when_override_unset() {
        let base = SalamanderConfig {
            tasklist: TaskListConfig {
                max_items: Some(16),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = merge_configs(base, SalamanderConfig::default());
        assert_eq!(merged.tasklist.max_items(), 16);
    }
}
