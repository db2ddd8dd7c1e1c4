//! Prometheus metrics for the cluster logger
//!
//! Gauges mirror the fields of the status line. There is no scrape
//! endpoint; the registry is rendered to a node_exporter textfile after
//! every cycle.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use prometheus::{IntCounter, IntGauge, IntGaugeVec, Opts, Registry};

use crate::node::Role;
use crate::report::ClusterSnapshot;

/// Cluster logger metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    // Replication metrics
    /// Seconds between primary clock and last replayed commit
    pub lag_seconds: IntGauge,
    /// Bytes behind the primary by stage (receive/replay)
    pub lag_bytes: IntGaugeVec,

    // Local server metrics
    /// Current client connections
    pub connections: IntGauge,
    /// Configured max_connections
    pub max_connections: IntGauge,
    /// Shared buffers by state (free/used)
    pub buffercache_buffers: IntGaugeVec,
    /// 1 for the current role of the local server
    pub role: IntGaugeVec,

    // Cluster metrics
    /// Members by access level
    pub nodes: IntGaugeVec,
    /// 1 while more than one member claims to be primary
    pub primary_conflict: IntGauge,

    // Logger metrics
    /// Completed cycles
    pub cycles_total: IntCounter,
    /// Lines appended to the status log
    pub log_writes_total: IntCounter,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let lag_seconds = IntGauge::new(
            "pg_cluster_logger_lag_seconds",
            "Replication lag of the local server in seconds",
        )?;

        let lag_bytes = IntGaugeVec::new(
            Opts::new(
                "pg_cluster_logger_lag_bytes",
                "Replication lag of the local server in bytes",
            ),
            &["stage"], // receive, replay
        )?;

        let connections = IntGauge::new(
            "pg_cluster_logger_connections",
            "Current number of client connections on the local server",
        )?;

        let max_connections = IntGauge::new(
            "pg_cluster_logger_max_connections",
            "Configured max_connections of the local server",
        )?;

        let buffercache_buffers = IntGaugeVec::new(
            Opts::new(
                "pg_cluster_logger_buffercache_buffers",
                "Shared buffers of the local server by state",
            ),
            &["state"], // free, used
        )?;

        let role = IntGaugeVec::new(
            Opts::new(
                "pg_cluster_logger_role",
                "Role of the local server (1 for the current role)",
            ),
            &["role"],
        )?;

        let nodes = IntGaugeVec::new(
            Opts::new(
                "pg_cluster_logger_nodes",
                "Cluster members by access level",
            ),
            &["access"], // down, ssh, psql, up
        )?;

        let primary_conflict = IntGauge::new(
            "pg_cluster_logger_primary_conflict",
            "Whether more than one member claims to be primary",
        )?;

        let cycles_total = IntCounter::new(
            "pg_cluster_logger_cycles_total",
            "Total number of completed polling cycles",
        )?;

        let log_writes_total = IntCounter::new(
            "pg_cluster_logger_log_writes_total",
            "Total number of lines appended to the status log",
        )?;

        registry.register(Box::new(lag_seconds.clone()))?;
        registry.register(Box::new(lag_bytes.clone()))?;
        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(max_connections.clone()))?;
        registry.register(Box::new(buffercache_buffers.clone()))?;
        registry.register(Box::new(role.clone()))?;
        registry.register(Box::new(nodes.clone()))?;
        registry.register(Box::new(primary_conflict.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(log_writes_total.clone()))?;

        Ok(Self {
            registry,
            lag_seconds,
            lag_bytes,
            connections,
            max_connections,
            buffercache_buffers,
            role,
            nodes,
            primary_conflict,
            cycles_total,
            log_writes_total,
        })
    }

    /// Update gauges from a cycle snapshot
    pub fn observe(&self, snapshot: &ClusterSnapshot) {
        self.cycles_total.inc();

        self.lag_seconds.set(snapshot.lag.time_lag_secs);
        self.lag_bytes
            .with_label_values(&["receive"])
            .set(snapshot.lag.receive_lag);
        self.lag_bytes
            .with_label_values(&["replay"])
            .set(snapshot.lag.replay_lag);

        self.connections.set(snapshot.connections);
        self.max_connections.set(snapshot.max_connections);
        self.buffercache_buffers
            .with_label_values(&["free"])
            .set(snapshot.buffer_cache.free);
        self.buffercache_buffers
            .with_label_values(&["used"])
            .set(snapshot.buffer_cache.used);

        for role in [Role::Primary, Role::Replica, Role::Unknown] {
            let label = role.to_string();
            self.role
                .with_label_values(&[label.as_str()])
                .set(i64::from(role == snapshot.role));
        }

        let counts = &snapshot.nodes;
        self.nodes.with_label_values(&["down"]).set(counts.down as i64);
        self.nodes
            .with_label_values(&["ssh"])
            .set(counts.ssh_only as i64);
        self.nodes
            .with_label_values(&["psql"])
            .set(counts.query_denied as i64);
        self.nodes.with_label_values(&["up"]).set(counts.up as i64);

        self.primary_conflict
            .set(i64::from(snapshot.primary_conflict));
    }

    /// Record a line appended to the status log
    pub fn record_log_write(&self) {
        self.log_writes_total.inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Write the textfile next to its final location, then rename it into place
    pub fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        let body = self.gather()?;
        let staging = staging_path(path);
        std::fs::write(&staging, body)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("metrics"));
    name.push(".tmp");
    path.with_file_name(name)
}
