use super::*;

#[test]
fn test_cli_build() {
    let app = build_cli();
    assert_eq!(app.get_name(), "salamander");
}

#[test]
fn test_cli_open_defaults() {
    let app = build_cli();
    let matches = app.try_get_matches_from(vec!["salamander", "open"]).unwrap();
    let open_matches = matches.subcommand_matches("open").unwrap();
    assert!(open_matches.get_one::<String>("path").is_none());
    assert!(!open_matches.get_flag("new-instance"));
}

#[test]
fn test_cli_open_with_panels() {
    let app = build_cli();
    let matches = app
        .try_get_matches_from(vec![
            "salamander",
            "open",
            "--left",
            "/srv/a",
            "--right",
            "/srv/b",
            "--panel",
            "2",
            "--title-prefix",
            "ops",
        ])
        .unwrap();
    let open_matches = matches.subcommand_matches("open").unwrap();
    assert_eq!(open_matches.get_one::<String>("left").unwrap(), "/srv/a");
    assert_eq!(open_matches.get_one::<String>("right").unwrap(), "/srv/b");
    assert_eq!(open_matches.get_one::<String>("panel").unwrap(), "2");
    assert_eq!(open_matches.get_one::<String>("title-prefix").unwrap(), "ops");
}

#[test]
fn test_cli_open_invalid_panel() {
    let app = build_cli();
    let matches = app.try_get_matches_from(vec!["salamander", "open", "--panel", "3"]);
    assert!(matches.is_err());
}

#[test]
fn test_cli_tasks_json_flag() {
    let app = build_cli();
    let matches = app
        .try_get_matches_from(vec!["salamander", "tasks", "--json"])
        .unwrap();
    assert!(matches.subcommand_matches("tasks").unwrap().get_flag("json"));
}

#[test]
fn test_cli_fire_command() {
    let app = build_cli();
    let matches = app
        .try_get_matches_from(vec!["salamander", "fire", "highlight", "--pid", "4242"])
        .unwrap();
    let fire_matches = matches.subcommand_matches("fire").unwrap();
    assert_eq!(fire_matches.get_one::<String>("todo").unwrap(), "highlight");
    assert_eq!(*fire_matches.get_one::<u32>("pid").unwrap(), 4242);
}

#[test]
fn test_cli_fire_rejects_activate() {
    let app = build_cli();
    let matches =
        app.try_get_matches_from(vec!["salamander", "fire", "activate", "--pid", "1"]);
    assert!(matches.is_err());
}

#[test]
fn test_cli_fire_requires_pid() {
    let app = build_cli();
    let matches = app.try_get_matches_from(vec!["salamander", "fire", "break"]);
    assert!(matches.is_err());
}

#[test]
fn test_cli_watch_requires_path() {
    let app = build_cli();
    assert!(app.clone().try_get_matches_from(vec!["salamander", "watch"]).is_err());
    let matches = app
        .try_get_matches_from(vec!["salamander", "watch", "/tmp"])
        .unwrap();
    let watch_matches = matches.subcommand_matches("watch").unwrap();
    assert_eq!(watch_matches.get_one::<String>("path").unwrap(), "/tmp");
}

#[test]
fn test_cli_global_flags_after_subcommand() {
    let app = build_cli();
    let matches = app
        .try_get_matches_from(vec!["salamander", "tasks", "-v", "--no-color"])
        .unwrap();
    assert!(matches.get_flag("verbose"));
    assert!(matches.get_flag("no-color"));
}
