use clap::ArgMatches;
use tracing::{error, info, warn};

use salamander_core::{Delivery, TaskListClient, Todo};

use super::helpers::{load_config_with_warning, resolve_paths};
use crate::color;

pub(crate) fn handle_fire_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let todo: Todo = matches
        .get_one::<String>("todo")
        .ok_or("Todo argument is required")?
        .parse()?;
    let pid = *matches
        .get_one::<u32>("pid")
        .ok_or("Pid argument is required")?;

    info!(event = "cli.fire_started", todo = %todo, pid = pid);

    let config = load_config_with_warning();
    let paths = resolve_paths()?;
    let client = TaskListClient::new(&paths, config.tasklist);

    let delivery = match client.fire_event(todo, pid) {
        Ok(delivery) => delivery,
        Err(e) => {
            eprintln!("{} {}", color::error("Could not send command:"), e);
            error!(event = "cli.fire_failed", todo = %todo, pid = pid, error = %e);
            return Err(e.into());
        }
    };

    match delivery {
        Delivery::Processed => {
            println!(
                "{} {} {}",
                color::success("Sent"),
                color::bold(&todo.to_string()),
                color::accent(&format!("to pid {}", pid))
            );
            info!(event = "cli.fire_completed", todo = %todo, pid = pid);
            Ok(())
        }
        other => {
            eprintln!(
                "{} {} to pid {}: {}",
                color::warning("Not delivered:"),
                todo,
                pid,
                other
            );
            if other == Delivery::NoResponder {
                eprintln!("  {}", color::hint("Run `salamander tasks` to list instances"));
            }
            warn!(event = "cli.fire_not_delivered", todo = %todo, pid = pid, delivery = %other);
            Err(format!("command not delivered: {}", other).into())
        }
    }
}
