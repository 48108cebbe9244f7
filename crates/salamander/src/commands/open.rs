use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use clap::ArgMatches;
use tracing::{debug, error, info, warn};

use salamander_config::RefreshConfig;
use salamander_core::{
    CommandLineParams, Delivery, InstanceHost, PanelSide, ProcessState, TaskList,
    TaskListClient, TimeCounter,
};

use super::helpers::{load_config_with_warning, resolve_paths, spawn_ctrl_c_listener, target_path};
use crate::color;
use crate::panel::{AppEvent, Panel};

/// Forwards control-thread requests into the main loop.
struct TerminalHost {
    events: Mutex<Sender<AppEvent>>,
}

impl TerminalHost {
    fn post(&self, event: AppEvent) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.send(event).is_err() {
            debug!(event = "cli.open.main_loop_gone");
        }
    }
}

impl InstanceHost for TerminalHost {
    fn flash_main_window(&self) {
        self.post(AppEvent::Flash);
    }

    fn wake_main(&self) {
        self.post(AppEvent::WakeFromIdle);
    }
}

pub(crate) fn handle_open_command(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let params = params_from_matches(matches);
    let new_instance = matches.get_flag("new-instance");

    info!(
        event = "cli.open_started",
        new_instance = new_instance,
        path = ?target_path(&params),
    );

    let config = load_config_with_warning();
    let paths = resolve_paths()?;

    if config.instance.only_one_instance() && !new_instance {
        let client = TaskListClient::new(&paths, config.tasklist.clone());
        match client.activate_running_instance(&params) {
            Ok(Delivery::Processed) => {
                println!(
                    "{}",
                    color::success("Handed over to the running instance.")
                );
                info!(event = "cli.open_handed_over");
                return Ok(());
            }
            Ok(delivery) => {
                info!(event = "cli.open_activation_declined", delivery = %delivery);
            }
            Err(e) => {
                warn!(event = "cli.open_activation_failed", error = %e);
            }
        }
    }

    let start_path = match target_path(&params) {
        Some(path) => path,
        None => match std::env::current_dir() {
            Ok(cwd) => cwd,
            Err(e) => {
                eprintln!("{} {}", color::error("Cannot read working directory:"), e);
                error!(event = "cli.open_failed", reason = "no_working_directory", error = %e);
                return Err(e.into());
            }
        },
    };
    if !start_path.is_dir() {
        eprintln!(
            "{} '{}' is not a directory",
            color::error("Cannot open:"),
            start_path.display()
        );
        error!(event = "cli.open_failed", path = %start_path.display(), reason = "not_a_directory");
        return Err(format!("not a directory: {}", start_path.display()).into());
    }

    let (tx, rx) = mpsc::channel();
    let host = Arc::new(TerminalHost {
        events: Mutex::new(tx.clone()),
    });
    let mut tasklist = match TaskList::init(&paths, config.tasklist.clone(), host) {
        Ok(tasklist) => tasklist,
        Err(e) => {
            eprintln!("{} {}", color::error("Could not register instance:"), e);
            error!(event = "cli.open_failed", error = %e);
            return Err(e.into());
        }
    };

    let counter = Arc::new(TimeCounter::new());
    let panel = match Panel::open(&start_path, Arc::clone(&counter), config.refresh.clone(), tx.clone()) {
        Ok(panel) => panel,
        Err(e) => {
            eprintln!("{} {}", color::error("Could not open panel:"), e);
            error!(event = "cli.open_failed", path = %start_path.display(), error = %e);
            return Err(e.into());
        }
    };
    match tasklist.set_process_state(ProcessState::Running, None) {
        Ok(true) => {}
        Ok(false) => warn!(event = "cli.open_state_update_timed_out"),
        Err(e) => warn!(event = "cli.open_state_update_failed", error = %e),
    }
    if let Err(e) = spawn_ctrl_c_listener(tx.clone()) {
        eprintln!("{} {}", color::error("Could not install Ctrl-C handler:"), e);
        error!(event = "cli.open_failed", reason = "signal_listener", error = %e);
        return Err(e);
    }

    println!(
        "{} {} {}",
        color::bold("Salamander"),
        color::muted(&format!("pid {}", tasklist.pid())),
        if tasklist.is_first_instance() {
            color::muted("(first instance)")
        } else {
            String::new()
        }
    );
    println!("  {} {}", color::muted("Panel:"), color::accent(&start_path.display().to_string()));
    if let Some(prefix) = &params.title_prefix {
        println!("  {} {}", color::muted("Title:"), prefix);
    }

    let mut app = MainLoop {
        tasklist: &tasklist,
        panel,
        counter,
        refresh_config: config.refresh,
        events: tx,
        last_request_uid: 0,
    };
    app.run(rx);
    app.panel.close();
    drop(app);

    tasklist.shutdown();
    info!(event = "cli.open_completed");
    Ok(())
}

struct MainLoop<'a> {
    tasklist: &'a TaskList,
    panel: Panel,
    counter: Arc<TimeCounter>,
    refresh_config: RefreshConfig,
    events: Sender<AppEvent>,
    last_request_uid: u64,
}

impl MainLoop<'_> {
    fn run(&mut self, events: Receiver<AppEvent>) {
        for event in events {
            match event {
                AppEvent::Quit => {
                    info!(event = "cli.open.quit_requested");
                    break;
                }
                AppEvent::Flash => {
                    println!("{}", color::caution("* another instance is looking for this one *"));
                }
                AppEvent::WakeFromIdle => self.take_activation(),
                AppEvent::Refreshed {
                    path,
                    entries,
                    stamp,
                    probably_useless,
                } => {
                    println!(
                        "{} {} {}{}",
                        color::accent(&path.display().to_string()),
                        color::muted(&format!("#{}", stamp)),
                        format_args!("{} entries", entries),
                        if probably_useless {
                            color::muted(" (probably unchanged)")
                        } else {
                            String::new()
                        }
                    );
                }
                AppEvent::Moved { to } => {
                    println!(
                        "{} {}",
                        color::caution("Directory vanished, now showing"),
                        color::accent(&to.display().to_string())
                    );
                    self.repoint(&to);
                }
            }
        }
    }

    fn take_activation(&mut self) {
        let now_ms = Utc::now().timestamp_millis();
        let Some(params) = self
            .tasklist
            .staging()
            .take_pending(self.last_request_uid, now_ms)
        else {
            debug!(event = "cli.open.wake_without_request");
            return;
        };
        self.last_request_uid = params.request_uid;
        info!(
            event = "cli.open.activation_received",
            request_uid = params.request_uid,
        );

        println!("{}", color::success("Activated by another launch."));
        if let Some(prefix) = &params.title_prefix {
            println!("  {} {}", color::muted("Title:"), prefix);
        }
        if let Some(path) = target_path(&params) {
            self.repoint(&path);
        }
    }

    /// Show `path` in the panel, replacing its driver and watcher.
    fn repoint(&mut self, path: &Path) {
        if self.panel.path() == Some(path) {
            return;
        }
        if !path.is_dir() {
            eprintln!(
                "{} '{}' is not a directory",
                color::warning("Ignoring path:"),
                path.display()
            );
            return;
        }
        self.panel.close();
        match Panel::open(
            path,
            Arc::clone(&self.counter),
            self.refresh_config.clone(),
            self.events.clone(),
        ) {
            Ok(panel) => {
                self.panel = panel;
                println!(
                    "  {} {}",
                    color::muted("Panel:"),
                    color::accent(&path.display().to_string())
                );
            }
            Err(e) => {
                eprintln!("{} {}", color::error("Could not open panel:"), e);
                error!(event = "cli.open.repoint_failed", path = %path.display(), error = %e);
            }
        }
    }
}

fn params_from_matches(matches: &ArgMatches) -> CommandLineParams {
    let left_path = matches.get_one::<String>("left").cloned();
    let right_path = matches.get_one::<String>("right").cloned();
    // Only meaningful when neither side is given
    let active_path = if left_path.is_none() && right_path.is_none() {
        matches.get_one::<String>("path").map(|p| absolute(p))
    } else {
        None
    };
    CommandLineParams {
        left_path: left_path.map(|p| absolute(&p)),
        right_path: right_path.map(|p| absolute(&p)),
        active_path,
        activate_panel: matches
            .get_one::<String>("panel")
            .map(|side| match side.as_str() {
                "2" => PanelSide::Right,
                _ => PanelSide::Left,
            }),
        title_prefix: matches.get_one::<String>("title-prefix").cloned(),
        main_window_icon_index: matches.get_one::<u32>("icon-index").copied(),
        ..Default::default()
    }
}

/// Resolve `path` against our working directory; the receiving instance
/// may run elsewhere.
fn absolute(path: &str) -> String {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return path.display().to_string();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_cli;

    fn open_params(args: &[&str]) -> CommandLineParams {
        let mut argv = vec!["salamander", "open"];
        argv.extend_from_slice(args);
        let matches = build_cli().try_get_matches_from(argv).unwrap();
        params_from_matches(matches.subcommand_matches("open").unwrap())
    }

    #[test]
    fn test_positional_path_becomes_active_path() {
        let params = open_params(&["/srv/data"]);
        assert_eq!(params.active_path.as_deref(), Some("/srv/data"));
        assert!(params.left_path.is_none());
        assert_eq!(params.request_uid, 0);
    }

    #[test]
    fn test_positional_path_ignored_with_sides() {
        let params = open_params(&["/srv/data", "--left", "/l", "--panel", "2"]);
        assert!(params.active_path.is_none());
        assert_eq!(params.left_path.as_deref(), Some("/l"));
        assert_eq!(params.activate_panel, Some(PanelSide::Right));
    }

    #[test]
    fn test_relative_paths_are_made_absolute() {
        let params = open_params(&["--right", "sub"]);
        let right = PathBuf::from(params.right_path.unwrap());
        assert!(right.is_absolute());
        assert!(right.ends_with("sub"));
    }

    #[test]
    fn test_host_forwards_to_main_loop() {
        let (tx, rx) = mpsc::channel();
        let host = TerminalHost {
            events: Mutex::new(tx),
        };
        host.flash_main_window();
        host.wake_main();
        assert_eq!(rx.try_recv().unwrap(), AppEvent::Flash);
        assert_eq!(rx.try_recv().unwrap(), AppEvent::WakeFromIdle);
    }
}
