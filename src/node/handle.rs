//! A handle on one cluster member
//!
//! The handle owns at most one live session. Every probe reconnects on
//! demand and degrades to a sentinel (`Role::Unknown`, `None`, `-1`) rather
//! than failing, so one unreachable member never stops a report.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::replication::{
    lsn_to_absolute, LagError, LagSample, PrimaryPosition, ReplayAnchor, ReplicaPositions,
};

use super::connection::{ConnectionError, Connector, Row, Session};
use super::params::NodeConnectionParams;
use super::probe::{tcp_reachable, AccessLevel};
use super::queries;

/// Replication role as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Replica,
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Replica => "replica",
            Self::Unknown => "unknown",
        })
    }
}

/// Buffer cache occupancy in pages; `-1` means unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCacheUsage {
    pub free: i64,
    pub used: i64,
}

impl BufferCacheUsage {
    pub const UNKNOWN: Self = Self { free: -1, used: -1 };

    #[cfg(test)]
    pub fn is_known(&self) -> bool {
        self.free >= 0 && self.used >= 0
    }
}

/// Settings shared by every handle
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Database port when the conninfo has none
    pub default_port: u16,
    /// Connect timeout when the conninfo has none
    pub connect_timeout: Duration,
    /// Upper bound on a single statement
    pub query_timeout: Duration,
    /// Administrative port probed as a liveness signal
    pub fallback_port: u16,
    /// Timeout for raw TCP probes
    pub probe_timeout: Duration,
    /// Trace query failures at warn instead of debug
    pub debug: bool,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            default_port: 5432,
            connect_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(5),
            fallback_port: 22,
            probe_timeout: Duration::from_millis(100),
            debug: false,
        }
    }
}

impl From<&Settings> for NodeOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            default_port: settings.postgresport,
            connect_timeout: settings.connection_timeout(),
            query_timeout: settings.query_timeout(),
            fallback_port: settings.ssh_port,
            probe_timeout: settings.probe_timeout(),
            debug: settings.debug,
        }
    }
}

/// Handle on a single cluster member
pub struct NodeHandle {
    params: NodeConnectionParams,
    options: NodeOptions,
    connector: Arc<dyn Connector>,
    session: Option<Box<dyn Session>>,
    anchor: ReplayAnchor,
    heartbeat_table_ready: bool,
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("host", &self.host())
            .field("connected", &self.is_connected())
            .field("anchor", &self.anchor)
            .finish()
    }
}

impl NodeHandle {
    pub fn new(
        params: NodeConnectionParams,
        options: NodeOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            params,
            options,
            connector,
            session: None,
            anchor: ReplayAnchor::default(),
            heartbeat_table_ready: false,
        }
    }

    pub fn host(&self) -> &str {
        self.params.host().unwrap_or("unknown")
    }

    pub fn port(&self) -> u16 {
        self.params.port().unwrap_or(self.options.default_port)
    }

    pub fn params(&self) -> &NodeConnectionParams {
        &self.params
    }

    /// Swap in re-derived parameters; a change forces a reconnect
    ///
    /// The replay anchor is kept: it belongs to the server, not the session.
    pub fn update_params(&mut self, params: NodeConnectionParams) {
        if params != self.params {
            debug!(host = %self.host(), "Connection parameters changed");
            self.params = params;
            self.session = None;
            self.heartbeat_table_ready = false;
        }
    }

    #[cfg(test)]
    pub fn anchor(&self) -> &ReplayAnchor {
        &self.anchor
    }

    /// Whether a session is held and not known to be closed
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Establish (or validate) the session
    pub async fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        self.session = None;

        match self
            .connector
            .connect(&self.params, self.options.default_port, self.options.connect_timeout)
            .await
        {
            Ok(session) => {
                debug!(host = %self.host(), "Connected to node");
                self.session = Some(session);
                true
            }
            Err(e) => {
                self.trace_failure("connect", &e);
                false
            }
        }
    }

    /// Run a statement, reconnecting first if needed
    pub async fn try_query(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> Result<Vec<Row>, ConnectionError> {
        if !self.connect().await {
            return Err(ConnectionError::Connect(format!(
                "{} unreachable",
                self.host()
            )));
        }
        let session = self.session.as_mut().ok_or(ConnectionError::Closed)?;

        let limit = self.options.query_timeout;
        let result = match tokio::time::timeout(limit, session.query(sql, params)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(limit)),
        };
        match result {
            Ok(rows) => Ok(rows),
            Err(e) => {
                if e.is_fatal() {
                    self.session = None;
                }
                Err(e)
            }
        }
    }

    /// Run a statement, treating any failure as "no result"
    pub async fn run_query(&mut self, sql: &str, params: &[&str]) -> Vec<Row> {
        match self.try_query(sql, params).await {
            Ok(rows) => rows,
            Err(e) => {
                self.trace_failure(sql, &e);
                Vec::new()
            }
        }
    }

    async fn first_row(&mut self, sql: &str, params: &[&str]) -> Option<Row> {
        self.run_query(sql, params).await.into_iter().next()
    }

    pub async fn role(&mut self) -> Role {
        let Some(row) = self.first_row(queries::IS_IN_RECOVERY, &[]).await else {
            return Role::Unknown;
        };
        match row.get_bool("in_recovery") {
            Ok(true) => Role::Replica,
            Ok(false) => Role::Primary,
            Err(e) => {
                debug!(host = %self.host(), error = %e, "Unreadable recovery state");
                Role::Unknown
            }
        }
    }

    pub async fn is_primary(&mut self) -> bool {
        self.role().await == Role::Primary
    }

    pub async fn is_replica(&mut self) -> bool {
        self.role().await == Role::Replica
    }

    /// Upsert this cluster member's heartbeat row
    ///
    /// Only writes when this handle is the primary. Returns whether a row
    /// was written.
    pub async fn heartbeat(&mut self, identity: &str) -> bool {
        if !self.is_primary().await {
            return false;
        }

        if !self.heartbeat_table_ready {
            if let Err(e) = self.try_query(queries::CREATE_HEARTBEAT_TABLE, &[]).await {
                warn!(host = %self.host(), error = %e, "Failed to create heartbeat table");
                return false;
            }
            self.heartbeat_table_ready = true;
        }

        match self.try_query(queries::UPSERT_HEARTBEAT, &[identity]).await {
            Ok(_) => true,
            Err(e) => {
                self.trace_failure("heartbeat", &e);
                // table may have been dropped underneath us
                self.heartbeat_table_ready = false;
                false
            }
        }
    }

    /// Receive/replay positions and replay timestamp, when this is a replica
    pub async fn local_lag_inputs(&mut self) -> Option<ReplicaPositions> {
        if !self.is_replica().await {
            return None;
        }
        let row = self.first_row(queries::REPLICA_POSITIONS, &[]).await?;

        // not streaming yet, or nothing replayed since startup
        let replay_lsn = row.get("replay_lsn")?;
        let replay_ts = row.get_f64("replay_ts").ok()?;
        let receive_lsn = row.get("receive_lsn").unwrap_or(replay_lsn);

        let parsed = lsn_to_absolute(replay_lsn)
            .and_then(|replay| lsn_to_absolute(receive_lsn).map(|receive| (receive, replay)));
        match parsed {
            Ok((receive, replay)) => Some(ReplicaPositions::new(receive, replay, replay_ts)),
            Err(e) => {
                warn!(host = %self.host(), error = %e, "Rejecting replica positions");
                None
            }
        }
    }

    /// Clock and current WAL position, when this is the primary
    pub async fn primary_lag_inputs(&mut self) -> Option<PrimaryPosition> {
        if !self.is_primary().await {
            return None;
        }
        let row = self.first_row(queries::PRIMARY_POSITION, &[]).await?;
        let timestamp = row.get_f64("now_ts").ok()?;
        let current = match lsn_to_absolute(row.get("current_lsn")?) {
            Ok(current) => current,
            Err(e) => {
                warn!(host = %self.host(), error = %e, "Rejecting primary position");
                return None;
            }
        };
        Some(PrimaryPosition { timestamp, current })
    }

    /// Lag of this replica behind `primary`
    ///
    /// `Err(Unavailable)` when the primary gives no data, `Ok(None)` when
    /// this node has nothing to compare or the sample went backwards.
    pub async fn compute_lag(
        &mut self,
        primary: &mut NodeHandle,
    ) -> Result<Option<LagSample>, LagError> {
        let primary_position = primary
            .primary_lag_inputs()
            .await
            .ok_or(LagError::Unavailable)?;

        // refresh the restart marker before trusting the anchor
        self.start_time().await;

        let Some(replica) = self.local_lag_inputs().await else {
            return Ok(None);
        };

        if !self.anchor.accept(replica.replay_timestamp) {
            debug!(
                host = %self.host(),
                replay_ts = replica.replay_timestamp,
                anchor = ?self.anchor.last_replay(),
                "Stale replay timestamp, skipping lag sample"
            );
            return Ok(None);
        }

        Ok(Some(LagSample::between(&primary_position, &replica)))
    }

    pub async fn config_parameter(&mut self, name: &str) -> Option<String> {
        self.first_row(queries::SETTING, &[name])
            .await
            .and_then(|row| row.get("value").map(str::to_string))
    }

    pub async fn connection_count(&mut self) -> Option<i64> {
        self.first_row(queries::CONNECTION_COUNT, &[])
            .await
            .and_then(|row| row.get_i64("connections").ok())
    }

    /// Needs the pg_buffercache extension; unknown otherwise
    pub async fn buffer_cache_usage(&mut self) -> BufferCacheUsage {
        let Some(row) = self.first_row(queries::BUFFER_CACHE, &[]).await else {
            return BufferCacheUsage::UNKNOWN;
        };
        match (row.get_i64("free"), row.get_i64("used")) {
            (Ok(free), Ok(used)) => BufferCacheUsage { free, used },
            _ => BufferCacheUsage::UNKNOWN,
        }
    }

    /// Postmaster start time; a change invalidates the replay anchor
    pub async fn start_time(&mut self) -> Option<String> {
        let start_time = self
            .first_row(queries::START_TIME, &[])
            .await
            .and_then(|row| row.get("start_time").map(str::to_string))?;

        if self.anchor.observe_start_time(&start_time) {
            info!(
                host = %self.host(),
                start_time = %start_time,
                "Server restart detected, resetting replay anchor"
            );
        }
        Some(start_time)
    }

    /// Query access, then database port, then fallback port
    pub async fn access_level(&mut self) -> AccessLevel {
        if self.try_query(queries::PING, &[]).await.is_ok() {
            return AccessLevel::Full;
        }

        let host = self.host().to_string();
        let timeout = self.options.probe_timeout;
        if tcp_reachable(&host, self.port(), timeout).await {
            AccessLevel::QueryDenied
        } else if tcp_reachable(&host, self.options.fallback_port, timeout).await {
            AccessLevel::SshOnly
        } else {
            AccessLevel::Down
        }
    }

    fn trace_failure(&self, what: &str, e: &ConnectionError) {
        if self.options.debug {
            warn!(host = %self.host(), what = %what, error = %e, "Node query failed");
        } else {
            debug!(host = %self.host(), what = %what, error = %e, "Node query failed");
        }
    }
}
