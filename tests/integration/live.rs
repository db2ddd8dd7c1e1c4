//! Logger against a live server

use std::time::Duration;

use crate::{
    get_server_config, send_signal, skip_if_not_enabled, spawn_logger, wait_for_lines,
    wait_with_timeout, write_config,
};

const FIELDS: [&str; 14] = [
    "bc_free",
    "bc_used",
    "con",
    "lag_receive",
    "lag_replay",
    "lag_sec",
    "master",
    "max_con",
    "nodes_down",
    "nodes_psql",
    "nodes_ssh",
    "nodes_up",
    "role",
    "starttime",
];

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let (_, fields) = line.split_once(": ")?;
    fields
        .split(' ')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

#[test]
fn test_first_cycle_writes_full_line() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("cluster.log");
    let config = write_config(dir.path(), &get_server_config().settings_toml(&logfile));

    let mut child = spawn_logger(&config);
    let lines = wait_for_lines(&logfile, 1, Duration::from_secs(15));
    send_signal(&child, "TERM");
    wait_with_timeout(&mut child, Duration::from_secs(15)).expect("logger should stop");

    assert!(!lines.is_empty(), "no status line written");
    let line = &lines[0];
    let keys: Vec<&str> = line
        .split_once(": ")
        .unwrap()
        .1
        .split(' ')
        .map(|kv| kv.split_once('=').unwrap().0)
        .collect();
    assert_eq!(keys, FIELDS);

    assert_ne!(field(line, "role"), Some("unknown"));
    assert_ne!(field(line, "starttime"), Some("unknown"));
    let connections: i64 = field(line, "con").unwrap().parse().unwrap();
    assert!(connections >= 1);
}

#[test]
fn test_sigusr1_forces_write() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("cluster.log");
    let body = get_server_config()
        .settings_toml(&logfile)
        .replace("cluster_logger_min_interval = 1", "cluster_logger_min_interval = 60");
    let config = write_config(dir.path(), &body);

    let mut child = spawn_logger(&config);
    let first = wait_for_lines(&logfile, 1, Duration::from_secs(15));
    assert_eq!(first.len(), 1);

    send_signal(&child, "USR1");
    let lines = wait_for_lines(&logfile, 2, Duration::from_secs(15));

    send_signal(&child, "TERM");
    let status =
        wait_with_timeout(&mut child, Duration::from_secs(15)).expect("logger should stop");
    assert!(status.success());
    assert_eq!(lines.len(), 2);
}

#[test]
fn test_sigterm_exits_cleanly() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("cluster.log");
    let config = write_config(dir.path(), &get_server_config().settings_toml(&logfile));

    let mut child = spawn_logger(&config);
    wait_for_lines(&logfile, 1, Duration::from_secs(15));
    send_signal(&child, "TERM");

    let status =
        wait_with_timeout(&mut child, Duration::from_secs(15)).expect("logger should stop");
    assert!(status.success());
}
