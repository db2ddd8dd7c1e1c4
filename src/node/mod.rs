//! Per-node access for cluster members
//!
//! This module provides:
//! - Connection parameters parsed from registration conninfo strings
//! - A database session seam with a tokio-postgres implementation
//! - `NodeHandle`: role, lag inputs, heartbeat and diagnostic probes
//! - Tiered reachability (query, database port, fallback port)

mod connection;
mod handle;
mod params;
mod probe;
pub(crate) mod queries;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionError, Connector, PgConnector, Row, RowError, Session};
pub use handle::{BufferCacheUsage, NodeHandle, NodeOptions, Role};
pub use params::{ConninfoError, NodeConnectionParams};
pub use probe::{tcp_reachable, AccessCounts, AccessLevel};
