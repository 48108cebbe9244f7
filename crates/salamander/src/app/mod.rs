mod global;
mod instance;
mod panel;

#[cfg(test)]
mod tests;

use clap::Command;

pub fn build_cli() -> Command {
    global::root_command()
        .subcommand(instance::open_command())
        .subcommand(instance::tasks_command())
        .subcommand(instance::fire_command())
        .subcommand(panel::watch_command())
}
