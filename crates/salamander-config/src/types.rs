//! Configuration type definitions.
//!
//! These types are deserialized from TOML config files.
//!
//! # Example Configuration
//!
//! ```toml
//! [refresh]
//! min_inactive_delay_ms = 2000
//! max_inactive_delay_ms = 10000
//!
//! [tasklist]
//! todo_timeout_ms = 5000
//! max_items = 500
//!
//! [instance]
//! only_one_instance = true
//! ```
//!
//! Fields are `Option<T>` so that a higher-priority config only overrides the
//! values it sets explicitly. Accessors supply the defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_INACTIVE_DELAY_MS: u64 = 2000;
pub const DEFAULT_MAX_INACTIVE_DELAY_MS: u64 = 10000;
pub const DEFAULT_REFRESH_DIR_EX_FAST_MS: u64 = 200;
pub const DEFAULT_REFRESH_DIR_EX_SLOW_MS: u64 = 5000;
pub const DEFAULT_SM_END_NOTIFY_MS: u64 = 200;
pub const DEFAULT_ICON_OVERLAY_PERIOD_MS: u64 = 2000;

pub const DEFAULT_TODO_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_ITEMS: usize = 500;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MISSED_HEARTBEATS: u32 = 5;
pub const DEFAULT_FIRE_LOCK_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_FIRE_REPLY_TIMEOUT_MS: u64 = 1000;

/// Upper bound accepted for `tasklist.max_items`.
pub const MAX_ITEMS_LIMIT: usize = 4096;

/// Main configuration loaded from TOML config files.
///
/// Loaded from `~/.salamander/config.toml`, then `./.salamander/config.toml`.
/// Project config values override user config values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalamanderConfig {
    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub tasklist: TaskListConfig,

    #[serde(default)]
    pub instance: InstanceConfig,
}

/// Panel refresh debouncing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Lower bound for the delay between refreshes while the app is in the background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_inactive_delay_ms: Option<u64>,

    /// Upper bound for the delay between refreshes while the app is in the background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_inactive_delay_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_dir_ex_fast_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_dir_ex_slow_ms: Option<u64>,

    /// Settling delay after suspend mode ends, before a latched refresh is replayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sm_end_notify_ms: Option<u64>,

    /// Minimum spacing between icon-overlay refreshes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_overlay_period_ms: Option<u64>,
}

impl RefreshConfig {
    pub fn min_inactive_delay(&self) -> Duration {
        Duration::from_millis(
            self.min_inactive_delay_ms
                .unwrap_or(DEFAULT_MIN_INACTIVE_DELAY_MS),
        )
    }

    pub fn max_inactive_delay(&self) -> Duration {
        Duration::from_millis(
            self.max_inactive_delay_ms
                .unwrap_or(DEFAULT_MAX_INACTIVE_DELAY_MS),
        )
    }

    pub fn refresh_dir_ex_fast(&self) -> Duration {
        Duration::from_millis(
            self.refresh_dir_ex_fast_ms
                .unwrap_or(DEFAULT_REFRESH_DIR_EX_FAST_MS),
        )
    }

    pub fn refresh_dir_ex_slow(&self) -> Duration {
        Duration::from_millis(
            self.refresh_dir_ex_slow_ms
                .unwrap_or(DEFAULT_REFRESH_DIR_EX_SLOW_MS),
        )
    }

    pub fn sm_end_notify(&self) -> Duration {
        Duration::from_millis(self.sm_end_notify_ms.unwrap_or(DEFAULT_SM_END_NOTIFY_MS))
    }

    pub fn icon_overlay_period(&self) -> Duration {
        Duration::from_millis(
            self.icon_overlay_period_ms
                .unwrap_or(DEFAULT_ICON_OVERLAY_PERIOD_MS),
        )
    }
}

/// Cross-process task list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskListConfig {
    /// How long a posted command stays valid, and the bound on most waits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_timeout_ms: Option<u64>,

    /// Capacity of the shared process table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,

    /// An entry whose heartbeat is older than `heartbeat_interval * missed_heartbeats`
    /// is treated as dead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missed_heartbeats: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_lock_timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_reply_timeout_ms: Option<u64>,
}

impl TaskListConfig {
    pub fn todo_timeout(&self) -> Duration {
        Duration::from_millis(self.todo_timeout_ms.unwrap_or(DEFAULT_TODO_TIMEOUT_MS))
    }

    pub fn max_items(&self) -> usize {
        self.max_items.unwrap_or(DEFAULT_MAX_ITEMS)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(
            self.heartbeat_interval_ms
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
        )
    }

    pub fn missed_heartbeats(&self) -> u32 {
        self.missed_heartbeats.unwrap_or(DEFAULT_MISSED_HEARTBEATS)
    }

    /// Age after which a silent entry is swept.
    pub fn heartbeat_expiry(&self) -> Duration {
        self.heartbeat_interval() * self.missed_heartbeats()
    }

    pub fn fire_lock_timeout(&self) -> Duration {
        Duration::from_millis(
            self.fire_lock_timeout_ms
                .unwrap_or(DEFAULT_FIRE_LOCK_TIMEOUT_MS),
        )
    }

    pub fn fire_reply_timeout(&self) -> Duration {
        Duration::from_millis(
            self.fire_reply_timeout_ms
                .unwrap_or(DEFAULT_FIRE_REPLY_TIMEOUT_MS),
        )
    }
}

/// Single-instance behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Hand command-line paths to a running sibling instead of starting a new instance.
    /// Default: true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_one_instance: Option<bool>,
}

impl InstanceConfig {
    pub fn only_one_instance(&self) -> bool {
        self.only_one_instance.unwrap_or(true)
    }
}
