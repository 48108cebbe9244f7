use std::path::PathBuf;
use std::sync::mpsc::Sender;

use salamander_core::{CommandLineParams, PanelSide, SalamanderConfig};
use salamander_paths::SalamanderPaths;
use tracing::{debug, warn};

use crate::color;
use crate::panel::AppEvent;

/// Load configuration with warning on errors.
///
/// Falls back to defaults if config loading fails, but tells the user on
/// stderr and logs `cli.config.load_failed`.
pub(crate) fn load_config_with_warning() -> SalamanderConfig {
    match SalamanderConfig::load_hierarchy() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "{} Could not load config: {}. Using defaults.",
                color::warning("Warning:"),
                e
            );
            eprintln!(
                "  {}",
                color::hint("Check ~/.salamander/config.toml and ./.salamander/config.toml")
            );
            warn!(event = "cli.config.load_failed", error = %e);
            SalamanderConfig::default()
        }
    }
}

pub(crate) fn resolve_paths() -> Result<SalamanderPaths, Box<dyn std::error::Error>> {
    SalamanderPaths::resolve().map_err(|e| {
        eprintln!("{} {}", color::error("Cannot locate data directory:"), e);
        e.into()
    })
}

/// Directory the single terminal panel should show for `params`.
///
/// The side named by `activate_panel` wins, then the other side, then the
/// active-panel path.
pub(crate) fn target_path(params: &CommandLineParams) -> Option<PathBuf> {
    let (first, second) = match params.activate_panel {
        Some(PanelSide::Right) => (&params.right_path, &params.left_path),
        _ => (&params.left_path, &params.right_path),
    };
    first
        .as_ref()
        .or(second.as_ref())
        .or(params.active_path.as_ref())
        .map(PathBuf::from)
}

/// Post `AppEvent::Quit` on Ctrl-C.
pub(crate) fn spawn_ctrl_c_listener(
    events: Sender<AppEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(event = "cli.signal.listen_failed", error = %e);
                    return;
                }
                debug!(event = "cli.signal.ctrl_c_received");
                let _ = events.send(AppEvent::Quit);
            });
        })?;
    Ok(())
}
