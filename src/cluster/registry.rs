//! Registry of cluster members keyed by host
//!
//! Membership is replaced on every refresh. Handles for hosts that stay in
//! the cluster are reused so their sessions and replay anchors survive;
//! handles for hosts that disappear are dropped, closing their sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::node::{AccessCounts, Connector, NodeConnectionParams, NodeHandle, NodeOptions};

/// Outcome of primary detection on the last refresh
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrimaryState {
    /// No member reported itself as primary
    #[default]
    None,
    /// Exactly one primary
    Unique(String),
    /// Several members claim to be primary; the first in membership order
    /// is used but nothing is arbitrated
    Conflict { chosen: String, others: Vec<String> },
}

impl PrimaryState {
    pub fn chosen(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Unique(host) => Some(host),
            Self::Conflict { chosen, .. } => Some(chosen),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Cluster members and the designated primary
pub struct ClusterRegistry {
    /// host -> handle
    nodes: HashMap<String, NodeHandle>,
    /// hosts in membership order
    order: Vec<String>,
    primary: PrimaryState,
    warnings: Vec<String>,
    options: NodeOptions,
    connector: Arc<dyn Connector>,
}

impl ClusterRegistry {
    pub fn new(options: NodeOptions, connector: Arc<dyn Connector>) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            primary: PrimaryState::None,
            warnings: Vec::new(),
            options,
            connector,
        }
    }

    /// Replace membership and re-detect the primary
    pub async fn refresh_membership(&mut self, members: Vec<NodeConnectionParams>) -> &PrimaryState {
        let mut previous = std::mem::take(&mut self.nodes);
        let mut order = Vec::with_capacity(members.len());

        for params in members {
            let Some(host) = params.host().map(str::to_string) else {
                warn!("Skipping member without host");
                continue;
            };
            if self.nodes.contains_key(&host) {
                warn!(host = %host, "Duplicate member in registration table");
                continue;
            }

            let handle = match previous.remove(&host) {
                Some(mut handle) => {
                    handle.update_params(params);
                    handle
                }
                None => {
                    info!(host = %host, "Node joined cluster membership");
                    NodeHandle::new(params, self.options.clone(), self.connector.clone())
                }
            };
            self.nodes.insert(host.clone(), handle);
            order.push(host);
        }

        for host in previous.keys() {
            info!(host = %host, "Node left cluster membership, releasing connection");
        }
        drop(previous);
        self.order = order;

        self.detect_primary().await;
        &self.primary
    }

    async fn detect_primary(&mut self) {
        let mut primaries = Vec::new();
        for host in &self.order {
            if let Some(handle) = self.nodes.get_mut(host) {
                if handle.is_primary().await {
                    primaries.push(host.clone());
                }
            }
        }

        let state = match primaries.len() {
            0 => PrimaryState::None,
            1 => PrimaryState::Unique(primaries.remove(0)),
            _ => {
                let chosen = primaries.remove(0);
                let warning = format!(
                    "multiple primaries observed: {} (using {})",
                    std::iter::once(chosen.as_str())
                        .chain(primaries.iter().map(String::as_str))
                        .collect::<Vec<_>>()
                        .join(","),
                    chosen
                );
                debug!(chosen = %chosen, others = ?primaries, "Multiple primaries observed");
                self.warnings.push(warning);
                PrimaryState::Conflict {
                    chosen,
                    others: primaries,
                }
            }
        };

        if state.chosen() != self.primary.chosen() {
            info!(
                old = self.primary.chosen().unwrap_or("none"),
                new = state.chosen().unwrap_or("none"),
                "Primary changed"
            );
        }
        self.primary = state;
    }

    /// Whether the designated primary still reports itself as primary
    pub async fn primary_is_current(&mut self) -> bool {
        let Some(host) = self.primary.chosen().map(str::to_string) else {
            return false;
        };
        match self.nodes.get_mut(&host) {
            Some(handle) => handle.is_primary().await,
            None => false,
        }
    }

    pub fn primary_state(&self) -> &PrimaryState {
        &self.primary
    }

    pub fn primary_host(&self) -> Option<&str> {
        self.primary.chosen()
    }

    pub fn primary_mut(&mut self) -> Option<&mut NodeHandle> {
        let host = self.primary.chosen()?;
        self.nodes.get_mut(host)
    }

    #[cfg(test)]
    pub fn get(&self, host: &str) -> Option<&NodeHandle> {
        self.nodes.get(host)
    }

    /// Hosts in membership order
    #[cfg(test)]
    pub fn hosts(&self) -> &[String] {
        &self.order
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Non-fatal warnings accumulated by refreshes
    #[cfg(test)]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drain warnings accumulated by refreshes
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Count members by reachability level
    pub async fn access_counts(&mut self) -> AccessCounts {
        let mut counts = AccessCounts::default();
        for host in &self.order {
            if let Some(handle) = self.nodes.get_mut(host) {
                let level = handle.access_level().await;
                debug!(host = %host, level = %level, "Node access level");
                counts.record(level);
            }
        }
        counts
    }
}
