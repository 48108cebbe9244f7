use clap::{Arg, Command};

pub fn watch_command() -> Command {
    Command::new("watch")
        .about("Show a single panel and print each refresh, without registering")
        .arg(
            Arg::new("path")
                .help("Directory to watch")
                .required(true)
                .index(1),
        )
}
