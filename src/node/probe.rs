//! Coarse reachability levels for cluster members

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::trace;

/// How far a node can be reached
///
/// Ordered from worst to best so levels compare naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    /// Neither the database port nor the fallback port answers
    Down = 0,
    /// Only the fallback administrative port answers
    SshOnly = 1,
    /// Database port is open but queries fail
    QueryDenied = 2,
    /// Queries succeed
    Full = 3,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Down => "down",
            Self::SshOnly => "ssh",
            Self::QueryDenied => "psql",
            Self::Full => "up",
        })
    }
}

/// Per-level node counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessCounts {
    pub down: usize,
    pub ssh_only: usize,
    pub query_denied: usize,
    pub up: usize,
}

impl AccessCounts {
    pub fn record(&mut self, level: AccessLevel) {
        match level {
            AccessLevel::Down => self.down += 1,
            AccessLevel::SshOnly => self.ssh_only += 1,
            AccessLevel::QueryDenied => self.query_denied += 1,
            AccessLevel::Full => self.up += 1,
        }
    }

    #[cfg(test)]
    pub fn total(&self) -> usize {
        self.down + self.ssh_only + self.query_denied + self.up
    }
}

impl FromIterator<AccessLevel> for AccessCounts {
    fn from_iter<I: IntoIterator<Item = AccessLevel>>(iter: I) -> Self {
        let mut counts = Self::default();
        for level in iter {
            counts.record(level);
        }
        counts
    }
}

/// Plain TCP connect with a hard timeout
pub async fn tcp_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    let reachable = matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    );
    trace!(host = %host, port = port, reachable = reachable, "TCP probe");
    reachable
}
