use clap::ArgMatches;
use tracing::{error, info};

use salamander_core::TaskListClient;

use super::helpers::{load_config_with_warning, resolve_paths};
use crate::color;
use crate::table::TableFormatter;

pub(crate) fn handle_tasks_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    info!(event = "cli.tasks_started", json_output = json_output);

    let config = load_config_with_warning();
    let paths = resolve_paths()?;
    let client = TaskListClient::new(&paths, config.tasklist);

    let snapshot = match client.items() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("{} {}", color::error("Could not read task list:"), e);
            error!(event = "cli.tasks_failed", error = %e);
            return Err(e.into());
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot.items)?);
    } else if snapshot.items.is_empty() {
        println!("No running instances.");
    } else {
        let own_pid = client.identity().pid;
        let formatter = TableFormatter::new(&snapshot.items, own_pid);
        formatter.print_header();
        for item in &snapshot.items {
            formatter.print_row(item);
        }
        println!();
        println!(
            "{}",
            color::muted(&format!(
                "{} instance(s), state #{}",
                snapshot.items.len(),
                snapshot.items_state_uid
            ))
        );
    }

    info!(
        event = "cli.tasks_completed",
        count = snapshot.items.len(),
        items_state_uid = snapshot.items_state_uid,
    );
    Ok(())
}
