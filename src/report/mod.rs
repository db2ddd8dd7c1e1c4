//! Status reporting
//!
//! This module provides:
//! - `ClusterSnapshot` and its sorted key=value `StatusLine`
//! - `StatusLog`: the append-only log with change and interval triggers
//! - `WriteTrigger`: forced-write handoff from the signal task
//! - `StatusReporter`: the per-cycle driver owning all carried state

mod reporter;
mod status;
mod trigger;
mod writer;

pub use reporter::StatusReporter;
pub use status::{ClusterSnapshot, StatusLine};
pub use trigger::WriteTrigger;
pub use writer::StatusLog;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Cannot open status log {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot write status log {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ReportError {
    /// Whether the process cannot continue
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Write { .. })
    }
}
