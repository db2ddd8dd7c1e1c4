//! Integration test entry point
//!
//! Run with: PG_CLUSTER_LOGGER_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Tests in `startup` always run. Tests in `live` need a reachable server
//! and are skipped unless enabled.
//!
//! Environment variables:
//! - PG_CLUSTER_LOGGER_RUN_INTEGRATION_TESTS: Set to "1" to enable live tests
//! - PG_CLUSTER_LOGGER_TEST_HOST: Server host (default: 127.0.0.1)
//! - PG_CLUSTER_LOGGER_TEST_PORT: Server port (default: 5432)
//! - PG_CLUSTER_LOGGER_TEST_USER: User (default: repmgr)
//! - PG_CLUSTER_LOGGER_TEST_DB: Database (default: repmgr)

mod live;
mod startup;

use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Check if live tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("PG_CLUSTER_LOGGER_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if live tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!(
                "Skipping integration test (set PG_CLUSTER_LOGGER_RUN_INTEGRATION_TESTS=1 to run)"
            );
            return;
        }
    };
}

/// Live server settings from environment
#[derive(Debug, Clone)]
pub struct ServerTestConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
}

pub fn get_server_config() -> ServerTestConfig {
    ServerTestConfig {
        host: env::var("PG_CLUSTER_LOGGER_TEST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: env::var("PG_CLUSTER_LOGGER_TEST_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432),
        user: env::var("PG_CLUSTER_LOGGER_TEST_USER").unwrap_or_else(|_| "repmgr".to_string()),
        database: env::var("PG_CLUSTER_LOGGER_TEST_DB").unwrap_or_else(|_| "repmgr".to_string()),
    }
}

impl ServerTestConfig {
    /// Settings file body pointing the logger at this server
    pub fn settings_toml(&self, logfile: &Path) -> String {
        format!(
            "node_name = \"it-node\"\n\
             cluster_logger_logfile = \"{}\"\n\
             pgsql_host = \"{}\"\n\
             postgresport = {}\n\
             pgsql_user = \"{}\"\n\
             pgsql_database = \"{}\"\n\
             cluster_logger_min_interval = 1\n",
            logfile.display(),
            self.host,
            self.port,
            self.user,
            self.database
        )
    }
}

/// Write a settings file into `dir`
pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("pg-cluster-logger.toml");
    let mut file = std::fs::File::create(&path).expect("Failed to create config file");
    file.write_all(body.as_bytes())
        .expect("Failed to write config file");
    path
}

/// Start the logger binary with `config` as its last settings file
pub fn spawn_logger(config: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_pg-cluster-logger"))
        .arg(config)
        .current_dir(config.parent().expect("config has a parent"))
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start logger")
}

/// Wait for the process to exit, killing it after `timeout`
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().expect("Failed to poll logger") {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let _ = child.kill();
    let _ = child.wait();
    None
}

/// Send a signal by name through the system `kill` utility
pub fn send_signal(child: &Child, signal: &str) {
    let status = Command::new("kill")
        .arg(format!("-{}", signal))
        .arg(child.id().to_string())
        .status()
        .expect("Failed to run kill");
    assert!(status.success(), "kill -{} failed", signal);
}

/// Lines of the status log, empty when it does not exist yet
pub fn read_log(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Poll the status log until it holds at least `count` lines
pub fn wait_for_lines(path: &Path, count: usize, timeout: Duration) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    loop {
        let lines = read_log(path);
        if lines.len() >= count || Instant::now() >= deadline {
            return lines;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
