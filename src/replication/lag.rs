//! Replication lag inputs, samples and the replay timestamp anchor

use thiserror::Error;

use super::lsn::LsnError;

/// Why a lag sample could not be produced for this cycle
#[derive(Debug, Error)]
pub enum LagError {
    #[error("No lag data available from primary")]
    Unavailable,
    #[error("Malformed position: {0}")]
    Format(#[from] LsnError),
}

/// Replica side of a lag computation (absolute WAL positions)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplicaPositions {
    /// Last WAL position received from the primary, never below `replay`
    pub receive: u64,
    /// Last WAL position replayed
    pub replay: u64,
    /// Commit timestamp of the last replayed transaction (epoch seconds)
    pub replay_timestamp: f64,
}

impl ReplicaPositions {
    /// Build from raw values, clamping receive to replay
    ///
    /// Out-of-order reporting can leave the receive position behind the
    /// replay position for a moment.
    pub fn new(receive: u64, replay: u64, replay_timestamp: f64) -> Self {
        Self {
            receive: receive.max(replay),
            replay,
            replay_timestamp,
        }
    }
}

/// Primary side of a lag computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryPosition {
    /// Primary clock at sampling time (epoch seconds)
    pub timestamp: f64,
    /// Current WAL write position
    pub current: u64,
}

/// One lag observation between a replica and the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LagSample {
    /// Seconds between primary clock and last replayed commit
    pub time_lag_secs: i64,
    /// Bytes of WAL not yet replayed
    pub replay_lag: i64,
    /// Bytes of WAL not yet received
    pub receive_lag: i64,
}

impl LagSample {
    pub fn between(primary: &PrimaryPosition, replica: &ReplicaPositions) -> Self {
        Self {
            time_lag_secs: (primary.timestamp - replica.replay_timestamp).round() as i64,
            replay_lag: position_delta(primary.current, replica.replay),
            receive_lag: position_delta(primary.current, replica.receive),
        }
    }
}

/// Signed difference; the replica may briefly be ahead of the sampled primary position
fn position_delta(primary: u64, replica: u64) -> i64 {
    primary.wrapping_sub(replica) as i64
}

/// Monotonic anchor for replay timestamps
///
/// Successive replay timestamps must not go backwards while the server
/// keeps the same start time. A restart clears the anchor.
#[derive(Debug, Default, Clone)]
pub struct ReplayAnchor {
    last_replay: Option<f64>,
    start_time: Option<String>,
}

impl ReplayAnchor {
    /// Record the server start time; returns true when it changed
    pub fn observe_start_time(&mut self, start_time: &str) -> bool {
        let restarted = matches!(&self.start_time, Some(prev) if prev != start_time);
        if restarted {
            self.last_replay = None;
        }
        if self.start_time.as_deref() != Some(start_time) {
            self.start_time = Some(start_time.to_string());
        }
        restarted
    }

    /// Accept a replay timestamp unless it is older than the anchor
    pub fn accept(&mut self, replay_timestamp: f64) -> bool {
        match self.last_replay {
            Some(prev) if replay_timestamp < prev => false,
            _ => {
                self.last_replay = Some(replay_timestamp);
                true
            }
        }
    }

    pub fn last_replay(&self) -> Option<f64> {
        self.last_replay
    }

    #[cfg(test)]
    pub fn start_time(&self) -> Option<&str> {
        self.start_time.as_deref()
    }
}
