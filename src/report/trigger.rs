//! Forced-write handoff between the signal task and the polling loop

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Single-flag request for an immediate log write
///
/// The signal task only sets the flag and wakes the loop; the loop takes
/// the flag at the start of its next cycle.
#[derive(Debug, Default)]
pub struct WriteTrigger {
    requested: AtomicBool,
    notify: Notify,
}

impl WriteTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Clear and return the pending request
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// Wait until a write is requested
    pub async fn requested(&self) {
        self.notify.notified().await
    }
}
