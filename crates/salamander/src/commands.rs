use clap::ArgMatches;
use tracing::{error, info};

mod fire;
mod helpers;
mod open;
mod tasks;
mod watch;

use fire::handle_fire_command;
use open::handle_open_command;
use tasks::handle_tasks_command;
use watch::handle_watch_command;

pub fn run_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        event = "cli.app.startup_completed",
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
    );

    match matches.subcommand() {
        Some(("open", sub_matches)) => handle_open_command(sub_matches),
        Some(("tasks", sub_matches)) => handle_tasks_command(sub_matches),
        Some(("fire", sub_matches)) => handle_fire_command(sub_matches),
        Some(("watch", sub_matches)) => handle_watch_command(sub_matches),
        _ => {
            error!(event = "cli.command_unknown");
            Err("Unknown command".into())
        }
    }
}
