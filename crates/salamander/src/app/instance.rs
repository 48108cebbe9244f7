use clap::{Arg, ArgAction, Command, value_parser};

pub fn open_command() -> Command {
    Command::new("open")
        .about("Open a panel, or hand the paths to an already running instance")
        .arg(
            Arg::new("path")
                .help("Directory for the active panel (default: current directory)")
                .index(1),
        )
        .arg(
            Arg::new("left")
                .long("left")
                .short('l')
                .help("Directory for the left panel"),
        )
        .arg(
            Arg::new("right")
                .long("right")
                .short('r')
                .help("Directory for the right panel"),
        )
        .arg(
            Arg::new("panel")
                .long("panel")
                .short('p')
                .help("Panel to activate: 1 = left, 2 = right")
                .value_parser(["1", "2"]),
        )
        .arg(
            Arg::new("title-prefix")
                .long("title-prefix")
                .short('t')
                .help("Prefix for the main window title"),
        )
        .arg(
            Arg::new("icon-index")
                .long("icon-index")
                .help("Main window icon variant")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("new-instance")
                .long("new-instance")
                .help("Always start a new instance, even if one is running")
                .action(ArgAction::SetTrue),
        )
}

pub fn tasks_command() -> Command {
    Command::new("tasks")
        .about("List registered instances")
        .arg(
            Arg::new("json")
                .long("json")
                .help("Output in JSON format")
                .action(ArgAction::SetTrue),
        )
}

pub fn fire_command() -> Command {
    Command::new("fire")
        .about("Send a command to a running instance")
        .arg(
            Arg::new("todo")
                .help("Command to send")
                .required(true)
                .index(1)
                .value_parser(["highlight", "break", "terminate"]),
        )
        .arg(
            Arg::new("pid")
                .long("pid")
                .help("Process ID of the target instance")
                .required(true)
                .value_parser(value_parser!(u32)),
        )
}
