use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Resolved monitor settings
///
/// Keys are flat so files written for the shell tooling around the cluster
/// can be shared as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Identity of the local cluster member (required)
    #[serde(default)]
    pub node_name: String,
    /// Append-only status log (required)
    #[serde(default)]
    pub cluster_logger_logfile: PathBuf,
    /// Database port when a conninfo has none
    #[serde(default = "default_postgres_port")]
    pub postgresport: u16,
    /// Seconds between cycles
    #[serde(default = "default_min_interval")]
    pub cluster_logger_min_interval: u64,
    /// Maximum seconds between log writes
    #[serde(default = "default_max_interval")]
    pub cluster_logger_max_interval: u64,
    /// Connect timeout (seconds)
    #[serde(default = "default_connection_timeout")]
    pub pgsql_connection_timeout: u64,
    /// Per-statement timeout (seconds)
    #[serde(default = "default_query_timeout")]
    pub pgsql_query_timeout: u64,
    /// Maximum seconds between membership re-reads
    #[serde(default = "default_membership_interval")]
    pub cluster_logger_membership_interval: u64,
    /// Minimum seconds between buffer cache samples
    #[serde(default = "default_buffercache_interval")]
    pub buffercache_interval: u64,
    /// Host or socket directory of the local server
    #[serde(default = "default_pgsql_host")]
    pub pgsql_host: String,
    #[serde(default = "default_pgsql_user")]
    pub pgsql_user: String,
    #[serde(default = "default_pgsql_database")]
    pub pgsql_database: String,
    /// Fallback liveness port
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// TCP probe timeout (milliseconds)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub debug: bool,
    /// Prometheus textfile output, written after each cycle when set
    #[serde(default)]
    pub cluster_logger_metrics_file: Option<PathBuf>,
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_min_interval() -> u64 {
    10
}

fn default_max_interval() -> u64 {
    300
}

fn default_connection_timeout() -> u64 {
    2
}

fn default_query_timeout() -> u64 {
    5
}

fn default_membership_interval() -> u64 {
    60
}

fn default_buffercache_interval() -> u64 {
    600
}

fn default_pgsql_host() -> String {
    "localhost".to_string()
}

fn default_pgsql_user() -> String {
    "repmgr".to_string()
}

fn default_pgsql_database() -> String {
    "repmgr".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_probe_timeout_ms() -> u64 {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            cluster_logger_logfile: PathBuf::new(),
            postgresport: default_postgres_port(),
            cluster_logger_min_interval: default_min_interval(),
            cluster_logger_max_interval: default_max_interval(),
            pgsql_connection_timeout: default_connection_timeout(),
            pgsql_query_timeout: default_query_timeout(),
            cluster_logger_membership_interval: default_membership_interval(),
            buffercache_interval: default_buffercache_interval(),
            pgsql_host: default_pgsql_host(),
            pgsql_user: default_pgsql_user(),
            pgsql_database: default_pgsql_database(),
            ssh_port: default_ssh_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
            debug: false,
            cluster_logger_metrics_file: None,
        }
    }
}

impl Settings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.cluster_logger_min_interval)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.cluster_logger_max_interval)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.pgsql_connection_timeout)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.pgsql_query_timeout)
    }

    pub fn membership_interval(&self) -> Duration {
        Duration::from_secs(self.cluster_logger_membership_interval)
    }

    pub fn buffercache_interval(&self) -> Duration {
        Duration::from_secs(self.buffercache_interval)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
