//! Write epochs
//!
//! An epoch id is the unix time in milliseconds of the start of the window
//! containing a given instant. A flush closes its log segment with the NEXT
//! epoch and then acknowledges everything up to the CURRENT epoch, so a flushed
//! segment stays in the log for at least one window.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Truncates wall-clock time to a fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochClock {
    window_ms: i64,
}

impl EpochClock {
    /// Clock with the given window, rounded to whole milliseconds (minimum 1ms)
    #[must_use]
    pub fn new(window: Duration) -> Self {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
        Self { window_ms }
    }

    /// Window length in milliseconds
    #[must_use]
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Epoch containing `at`
    #[must_use]
    pub fn epoch_at(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp_millis().div_euclid(self.window_ms) * self.window_ms
    }

    /// Epoch following the one containing `at`
    #[must_use]
    pub fn next_epoch_at(&self, at: DateTime<Utc>) -> i64 {
        self.epoch_at(at).saturating_add(self.window_ms)
    }

    /// Current epoch
    #[must_use]
    pub fn current(&self) -> i64 {
        self.epoch_at(Utc::now())
    }

    /// Next epoch
    #[must_use]
    pub fn next(&self) -> i64 {
        self.next_epoch_at(Utc::now())
    }
}
