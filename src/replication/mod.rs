//! Replication position arithmetic and lag bookkeeping

mod lag;
mod lsn;

pub use lag::{LagError, LagSample, PrimaryPosition, ReplayAnchor, ReplicaPositions};
pub use lsn::{lsn_to_absolute, LsnError};
