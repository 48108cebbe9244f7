//! Configuration validation logic.

use crate::errors::ConfigError;
use crate::types::{MAX_ITEMS_LIMIT, SalamanderConfig};

/// Validate a `SalamanderConfig`, returning an error if any values are invalid.
///
/// # Validation Rules
///
/// - `refresh.min_inactive_delay` must not exceed `refresh.max_inactive_delay`
/// - Every timeout and interval must be non-zero
/// - `tasklist.max_items` must be within `1..=MAX_ITEMS_LIMIT`
/// - `tasklist.missed_heartbeats` must be at least 1
pub fn validate_config(config: &SalamanderConfig) -> Result<(), ConfigError> {
    let refresh = &config.refresh;
    if refresh.min_inactive_delay() > refresh.max_inactive_delay() {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "refresh.min_inactive_delay_ms ({}) exceeds refresh.max_inactive_delay_ms ({})",
                refresh.min_inactive_delay().as_millis(),
                refresh.max_inactive_delay().as_millis()
            ),
        });
    }

    let tasklist = &config.tasklist;
    let durations = [
        ("refresh.refresh_dir_ex_fast_ms", refresh.refresh_dir_ex_fast()),
        ("refresh.refresh_dir_ex_slow_ms", refresh.refresh_dir_ex_slow()),
        ("refresh.sm_end_notify_ms", refresh.sm_end_notify()),
        ("tasklist.todo_timeout_ms", tasklist.todo_timeout()),
        ("tasklist.heartbeat_interval_ms", tasklist.heartbeat_interval()),
        ("tasklist.fire_lock_timeout_ms", tasklist.fire_lock_timeout()),
        ("tasklist.fire_reply_timeout_ms", tasklist.fire_reply_timeout()),
    ];
    for (name, value) in durations {
        if value.is_zero() {
            return Err(ConfigError::InvalidConfiguration {
                message: format!("{} must be greater than zero", name),
            });
        }
    }

    let max_items = tasklist.max_items();
    if max_items == 0 || max_items > MAX_ITEMS_LIMIT {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "tasklist.max_items must be between 1 and {} (got {})",
                MAX_ITEMS_LIMIT, max_items
            ),
        });
    }

    if tasklist.missed_heartbeats() == 0 {
        return Err(ConfigError::InvalidConfiguration {
            message: "tasklist.missed_heartbeats must be at least 1".to_string(),
        });
    }

    Ok(())
}
