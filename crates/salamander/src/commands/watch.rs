use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use clap::ArgMatches;
use tracing::{error, info};

use salamander_core::TimeCounter;

use super::helpers::{load_config_with_warning, spawn_ctrl_c_listener};
use crate::color;
use crate::panel::{AppEvent, Panel};

/// Follow one directory without registering in the task list.
pub(crate) fn handle_watch_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let path = matches
        .get_one::<String>("path")
        .map(PathBuf::from)
        .ok_or("Path argument is required")?;

    info!(event = "cli.watch_started", path = %path.display());

    if !path.is_dir() {
        eprintln!(
            "{} '{}' is not a directory",
            color::error("Cannot watch:"),
            path.display()
        );
        error!(event = "cli.watch_failed", path = %path.display(), reason = "not_a_directory");
        return Err(format!("not a directory: {}", path.display()).into());
    }

    let config = load_config_with_warning();
    let (tx, rx) = mpsc::channel();
    let mut panel = match Panel::open(&path, Arc::new(TimeCounter::new()), config.refresh, tx.clone()) {
        Ok(panel) => panel,
        Err(e) => {
            eprintln!("{} {}", color::error("Could not open panel:"), e);
            error!(event = "cli.watch_failed", path = %path.display(), error = %e);
            return Err(e.into());
        }
    };
    if let Err(e) = spawn_ctrl_c_listener(tx) {
        eprintln!("{} {}", color::error("Could not install Ctrl-C handler:"), e);
        error!(event = "cli.watch_failed", reason = "signal_listener", error = %e);
        return Err(e);
    }

    println!(
        "{} {} {}",
        color::bold("Watching"),
        color::accent(&path.display().to_string()),
        color::muted("(Ctrl-C to stop)")
    );

    let mut refreshes = 0u64;
    for event in rx {
        match event {
            AppEvent::Refreshed {
                entries,
                stamp,
                probably_useless,
                ..
            } => {
                refreshes += 1;
                let note = if probably_useless { " (probably unchanged)" } else { "" };
                println!(
                    "{} {} entries{}",
                    color::muted(&format!("#{}", stamp)),
                    entries,
                    color::muted(note)
                );
            }
            AppEvent::Moved { to } => {
                println!(
                    "{} {}",
                    color::caution("Directory vanished, now watching"),
                    color::accent(&to.display().to_string())
                );
            }
            AppEvent::Quit => break,
            // No task list, so nobody flashes or wakes us
            AppEvent::Flash | AppEvent::WakeFromIdle => {}
        }
    }

    panel.close();
    info!(event = "cli.watch_completed", refreshes = refreshes);
    Ok(())
}
