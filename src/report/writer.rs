//! Append-only status log with change-driven writes

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, info};

use super::status::StatusLine;
use super::ReportError;

/// Status log file plus what was last written to it
pub struct StatusLog {
    path: PathBuf,
    file: File,
    max_interval: Duration,
    last_line: Option<String>,
    last_write: Option<Instant>,
}

impl StatusLog {
    /// Open (creating if needed) the log for appending
    pub fn open(path: impl AsRef<Path>, max_interval: Duration) -> Result<Self, ReportError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ReportError::Open {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), "Opened status log");

        Ok(Self {
            path,
            file,
            max_interval,
            last_line: None,
            last_write: None,
        })
    }

    /// Write `line` if it changed, the max interval elapsed, or `force` is set
    ///
    /// Returns whether a line was appended.
    pub fn emit(&mut self, line: &StatusLine, force: bool) -> Result<bool, ReportError> {
        self.emit_at(line, force, Instant::now())
    }

    pub(crate) fn emit_at(
        &mut self,
        line: &StatusLine,
        force: bool,
        now: Instant,
    ) -> Result<bool, ReportError> {
        let rendered = line.render();
        if !force && !self.is_due(&rendered, now) {
            debug!("Status unchanged, write suppressed");
            return Ok(false);
        }

        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(self.file, "{}: {}", stamp, rendered)
            .and_then(|_| self.file.flush())
            .map_err(|source| ReportError::Write {
                path: self.path.clone(),
                source,
            })?;

        self.last_line = Some(rendered);
        self.last_write = Some(now);
        Ok(true)
    }

    fn is_due(&self, rendered: &str, now: Instant) -> bool {
        if self.last_line.as_deref() != Some(rendered) {
            return true;
        }
        match self.last_write {
            Some(at) => now.saturating_duration_since(at) >= self.max_interval,
            None => true,
        }
    }
}
