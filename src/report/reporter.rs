//! One polling cycle: observe the cluster, render, persist

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cluster::{fetch_members, ClusterRegistry, PrimaryState};
use crate::config::Settings;
use crate::metrics::Metrics;
use crate::node::{BufferCacheUsage, Connector, NodeConnectionParams, NodeHandle, NodeOptions};
use crate::replication::{LagError, LagSample};

use super::status::ClusterSnapshot;
use super::writer::StatusLog;
use super::ReportError;

/// Owns all state carried between cycles
pub struct StatusReporter {
    identity: String,
    buffercache_interval: Duration,
    membership_interval: Duration,
    metrics_file: Option<PathBuf>,
    local: NodeHandle,
    registry: ClusterRegistry,
    /// When membership was last read, successfully or not
    membership_read_at: Option<Instant>,
    /// Last buffer cache sample and when it was taken
    buffer_cache: Option<(Instant, BufferCacheUsage)>,
    metrics: Metrics,
    log: StatusLog,
}

impl StatusReporter {
    /// Open the status log and set up handles; nothing is contacted yet
    pub fn new(settings: &Settings, connector: Arc<dyn Connector>) -> Result<Self, ReportError> {
        let options = NodeOptions::from(settings);
        let log = StatusLog::open(&settings.cluster_logger_logfile, settings.max_interval())?;

        Ok(Self {
            identity: settings.node_name.clone(),
            buffercache_interval: settings.buffercache_interval(),
            membership_interval: settings.membership_interval(),
            metrics_file: settings.cluster_logger_metrics_file.clone(),
            local: NodeHandle::new(local_params(settings), options.clone(), connector.clone()),
            registry: ClusterRegistry::new(options, connector),
            membership_read_at: None,
            buffer_cache: None,
            metrics: Metrics::new()?,
            log,
        })
    }

    #[cfg(test)]
    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Observe, emit and export once; returns whether a line was written
    pub async fn run_cycle(&mut self, force: bool) -> Result<bool, ReportError> {
        let snapshot = self.snapshot().await;
        self.metrics.observe(&snapshot);

        let written = self.log.emit(&snapshot.status_line(), force)?;
        if written {
            self.metrics.record_log_write();
        }

        if let Some(path) = &self.metrics_file {
            if let Err(e) = self.metrics.write_textfile(path) {
                warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
            }
        }
        Ok(written)
    }

    /// Observe the cluster and the local server
    ///
    /// Never fails: anything that cannot be read is reported with its
    /// sentinel (`unknown`, `-1`, zero lag).
    pub async fn snapshot(&mut self) -> ClusterSnapshot {
        if self.membership_due() || !self.registry.primary_is_current().await {
            self.refresh_membership().await;
        }
        self.report_warnings();

        let master = self
            .registry
            .primary_host()
            .unwrap_or("unknown")
            .to_string();
        if let Some(primary) = self.registry.primary_mut() {
            primary.heartbeat(&self.identity).await;
        }

        let connections = self.local.connection_count().await.unwrap_or(-1);
        let max_connections = self
            .local
            .config_parameter("max_connections")
            .await
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(-1);
        let role = self.local.role().await;
        let start_time = self
            .local
            .start_time()
            .await
            .unwrap_or_else(|| "unknown".to_string());
        let buffer_cache = self.buffer_cache_usage().await;
        let lag = self.lag().await;
        let nodes = self.registry.access_counts().await;

        ClusterSnapshot {
            master,
            connections,
            max_connections,
            role,
            start_time,
            buffer_cache,
            lag,
            nodes,
            primary_conflict: self.registry.primary_state().is_conflict(),
        }
    }

    /// Whether membership should be re-read regardless of the primary
    ///
    /// A conflict is re-examined every cycle so it clears as soon as the
    /// extra primaries step down.
    fn membership_due(&self) -> bool {
        if self.registry.primary_state().is_conflict() {
            return true;
        }
        match self.membership_read_at {
            Some(read_at) => read_at.elapsed() >= self.membership_interval,
            None => true,
        }
    }

    /// Reload membership through the local server, keeping the old one on failure
    async fn refresh_membership(&mut self) {
        self.membership_read_at = Some(Instant::now());
        match fetch_members(&mut self.local).await {
            Ok(members) => {
                debug!(count = members.len(), "Fetched cluster membership");
                for member in &members {
                    debug!(
                        node_id = member.node_id,
                        node_name = %member.node_name,
                        host = member.params.host().unwrap_or("-"),
                        "Cluster member"
                    );
                }
                let params = members.into_iter().map(|m| m.params).collect();
                self.registry.refresh_membership(params).await;
            }
            Err(e) => {
                warn!(error = %e, "Membership refresh failed, keeping previous membership");
            }
        }
    }

    fn report_warnings(&mut self) {
        let warnings = self.registry.take_warnings();
        if warnings.is_empty() {
            if let PrimaryState::Conflict { chosen, others } = self.registry.primary_state() {
                warn!(chosen = %chosen, others = ?others, "Multiple primaries still reported");
            }
        }
        for warning in warnings {
            warn!("{}", warning);
        }
    }

    async fn buffer_cache_usage(&mut self) -> BufferCacheUsage {
        let now = Instant::now();
        if let Some((sampled_at, usage)) = self.buffer_cache {
            if now.saturating_duration_since(sampled_at) < self.buffercache_interval {
                return usage;
            }
        }

        let usage = self.local.buffer_cache_usage().await;
        debug!(free = usage.free, used = usage.used, "Sampled buffer cache");
        self.buffer_cache = Some((now, usage));
        usage
    }

    async fn lag(&mut self) -> LagSample {
        let result = match self.registry.primary_mut() {
            Some(primary) => self.local.compute_lag(primary).await,
            None => Err(LagError::Unavailable),
        };

        match result {
            Ok(Some(sample)) => sample,
            Ok(None) => LagSample::default(),
            Err(e) => {
                info!(error = %e, "Lag unavailable this cycle");
                LagSample::default()
            }
        }
    }
}

fn local_params(settings: &Settings) -> NodeConnectionParams {
    NodeConnectionParams::new()
        .with("host", settings.pgsql_host.as_str())
        .with("port", settings.postgresport.to_string())
        .with("user", settings.pgsql_user.as_str())
        .with("dbname", settings.pgsql_database.as_str())
}
