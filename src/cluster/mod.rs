//! Cluster membership and primary designation

mod membership;
mod registry;

pub use membership::{fetch_members, Member, MembershipError};
pub use registry::{ClusterRegistry, PrimaryState};
