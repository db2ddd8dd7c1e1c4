//! Cycle snapshot and its key=value rendering

use std::collections::BTreeMap;
use std::fmt;

use crate::node::{AccessCounts, BufferCacheUsage, Role};
use crate::replication::LagSample;

/// Everything one cycle observed about the cluster and the local server
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSnapshot {
    /// Host of the designated primary, or `unknown`
    pub master: String,
    pub connections: i64,
    pub max_connections: i64,
    pub role: Role,
    pub start_time: String,
    pub buffer_cache: BufferCacheUsage,
    pub lag: LagSample,
    pub nodes: AccessCounts,
    /// More than one member claims to be primary
    pub primary_conflict: bool,
}

impl ClusterSnapshot {
    pub fn status_line(&self) -> StatusLine {
        let mut line = StatusLine::new();
        line.insert("master", &self.master);
        line.insert("con", self.connections);
        line.insert("max_con", self.max_connections);
        line.insert("role", self.role);
        line.insert("starttime", &self.start_time);
        line.insert("bc_free", self.buffer_cache.free);
        line.insert("bc_used", self.buffer_cache.used);
        line.insert("lag_sec", self.lag.time_lag_secs);
        line.insert("lag_replay", self.lag.replay_lag);
        line.insert("lag_receive", self.lag.receive_lag);
        line.insert("nodes_down", self.nodes.down);
        line.insert("nodes_ssh", self.nodes.ssh_only);
        line.insert("nodes_psql", self.nodes.query_denied);
        line.insert("nodes_up", self.nodes.up);
        line
    }
}

/// Field name -> value, always rendered sorted by name
///
/// Values never contain whitespace, so a rendered line splits back into
/// fields on single spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    fields: BTreeMap<String, String>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        let value: String = value
            .to_string()
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}
