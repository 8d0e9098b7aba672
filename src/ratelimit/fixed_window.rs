//! Fixed window limiter.

use std::time::Duration;
use tokio::time::Instant;

use super::algorithm::{advance, deadline, elapsed_periods, Algorithm};

/// Counts permits issued in the current window and resets the count when
/// the window ends.
///
/// Windows are aligned to the instant the limiter was created, so a late
/// acquisition never shifts later boundaries.
#[derive(Debug)]
pub struct FixedWindow {
    /// Maximum permits per window
    permit_limit: u32,
    /// Length of a window
    window: Duration,
    /// When the current window started
    window_start: Instant,
    /// Permits issued in the current window
    issued: u32,
}

impl FixedWindow {
    /// Create a new fixed window whose first window starts at `now`.
    pub fn new(permit_limit: u32, window: Duration, now: Instant) -> Self {
        Self {
            permit_limit,
            window,
            window_start: now,
            issued: 0,
        }
    }

    /// Get the number of permits issued in the current window.
    pub fn issued(&self) -> u32 {
        self.issued
    }

    /// End of the current window; `None` when it lies beyond the clock's range.
    fn window_end(&self) -> Option<Instant> {
        deadline(self.window_start, self.window, 1)
    }
}

impl Algorithm for FixedWindow {
    fn kind(&self) -> &'static str {
        "fixed_window"
    }

    fn limit(&self) -> u32 {
        self.permit_limit
    }

    fn replenish(&mut self, now: Instant) {
        let windows = elapsed_periods(self.window_start, now, self.window);
        if windows > 0 {
            self.window_start = advance(self.window_start, now, self.window, windows);
            self.issued = 0;
        }
    }

    fn available(&self) -> u32 {
        self.permit_limit.saturating_sub(self.issued)
    }

    fn take(&mut self, permits: u32, _now: Instant) {
        self.issued = self.issued.saturating_add(permits);
    }

    fn rollback(&mut self, permits: u32, granted_at: Instant) {
        // Permits from an earlier window were already forgotten at rollover.
        if granted_at >= self.window_start {
            self.issued = self.issued.saturating_sub(permits);
        }
    }

    fn next_replenishment(&self) -> Option<Instant> {
        self.window_end()
    }

    fn retry_after(&self, _permits: u32, now: Instant) -> Option<Duration> {
        self.window_end().map(|end| end.saturating_duration_since(now))
    }
}
