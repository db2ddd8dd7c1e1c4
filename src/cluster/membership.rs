//! Cluster membership from the replication registration table

use thiserror::Error;
use tracing::warn;

use crate::node::{queries, NodeConnectionParams, NodeHandle};

/// Membership could not be read at all
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Registration table unavailable on {host}: {reason}")]
    Unavailable { host: String, reason: String },
}

/// One registered cluster member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub node_id: i64,
    pub node_name: String,
    pub params: NodeConnectionParams,
}

/// Read active members through `source`
///
/// Rows with an unparsable conninfo are skipped with a warning; only a
/// failure to query the table at all is an error, so callers can keep
/// their previous membership.
pub async fn fetch_members(source: &mut NodeHandle) -> Result<Vec<Member>, MembershipError> {
    let rows = source
        .try_query(queries::MEMBERSHIP, &[])
        .await
        .map_err(|e| MembershipError::Unavailable {
            host: source.host().to_string(),
            reason: e.to_string(),
        })?;

    let mut members = Vec::with_capacity(rows.len());
    for row in rows {
        let node_name = row.get("node_name").unwrap_or_default().to_string();
        let conninfo = match row.get_str("conninfo") {
            Ok(conninfo) => conninfo,
            Err(e) => {
                warn!(node = %node_name, error = %e, "Skipping registration row");
                continue;
            }
        };
        match NodeConnectionParams::from_conninfo(conninfo) {
            Ok(params) => members.push(Member {
                node_id: row.get_i64("node_id").unwrap_or(-1),
                node_name,
                params,
            }),
            Err(e) => {
                warn!(node = %node_name, error = %e, "Skipping malformed conninfo");
            }
        }
    }

    Ok(members)
}
