//! Startup failures that must stop the process

use std::time::Duration;

use crate::{spawn_logger, wait_with_timeout, write_config};

#[test]
fn test_missing_identity_exits() {
    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("cluster.log");
    let config = write_config(
        dir.path(),
        &format!("cluster_logger_logfile = \"{}\"\n", logfile.display()),
    );

    let mut child = spawn_logger(&config);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10))
        .expect("logger should exit without an identity");
    assert!(!status.success());
    assert!(!logfile.exists());
}

#[test]
fn test_unopenable_log_exits() {
    let dir = tempfile::tempdir().unwrap();
    let logfile = dir.path().join("missing").join("cluster.log");
    let config = write_config(
        dir.path(),
        &format!(
            "node_name = \"it-node\"\ncluster_logger_logfile = \"{}\"\n",
            logfile.display()
        ),
    );

    let mut child = spawn_logger(&config);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10))
        .expect("logger should exit when the log cannot be opened");
    assert!(!status.success());
}

#[test]
fn test_malformed_config_exits() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "node_name = \n");

    let mut child = spawn_logger(&config);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10))
        .expect("logger should exit on a malformed config");
    assert!(!status.success());
}
