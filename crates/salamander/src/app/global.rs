use clap::{Arg, ArgAction, Command};

pub fn root_command() -> Command {
    Command::new("salamander")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Open Salamander panels and coordinate running instances")
        .long_about("Opens a directory panel that re-reads itself when the directory changes, and coordinates with other running instances of the same user: a second launch hands its paths to the running instance instead of starting a new one.")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
}
