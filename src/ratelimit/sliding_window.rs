//! Sliding window limiter.

use std::time::Duration;
use tokio::time::Instant;

use super::algorithm::{advance, deadline, elapsed_periods, Algorithm};

/// Splits the window into equal segments and counts permits per segment.
///
/// The admission count is the sum over every segment still inside the
/// trailing window, so a burst at the end of one window keeps counting
/// against the start of the next one until its segment slides out.
#[derive(Debug)]
pub struct SlidingWindow {
    permit_limit: u32,
    /// Length of one segment
    segment: Duration,
    /// Permits issued per segment, used as a ring
    segments: Vec<u32>,
    /// Index of the segment currently being filled
    current: usize,
    /// When the current segment started
    segment_start: Instant,
    /// Sum of all segment counts
    total: u32,
}

impl SlidingWindow {
    /// Create a sliding window of `segments_per_window` segments.
    ///
    /// `segments_per_window` must be non-zero and must divide `window` into
    /// non-zero segments; policy validation enforces both.
    pub fn new(permit_limit: u32, window: Duration, segments_per_window: u32, now: Instant) -> Self {
        let count = segments_per_window.max(1);
        Self {
            permit_limit,
            segment: window / count,
            segments: vec![0; count as usize],
            current: 0,
            segment_start: now,
            total: 0,
        }
    }

    /// Get the sum of permits counted in the trailing window.
    pub fn total(&self) -> u32 {
        self.total
    }

    fn segment_end(&self) -> Option<Instant> {
        deadline(self.segment_start, self.segment, 1)
    }

    /// Evict the oldest segment and make it the current one.
    fn slide(&mut self) {
        self.current = (self.current + 1) % self.segments.len();
        self.total = self.total.saturating_sub(self.segments[self.current]);
        self.segments[self.current] = 0;
    }
}

impl Algorithm for SlidingWindow {
    fn kind(&self) -> &'static str {
        "sliding_window"
    }

    fn limit(&self) -> u32 {
        self.permit_limit
    }

    fn replenish(&mut self, now: Instant) {
        let elapsed = elapsed_periods(self.segment_start, now, self.segment);
        if elapsed == 0 {
            return;
        }

        let steps = (elapsed as usize).min(self.segments.len());
        for _ in 0..steps {
            self.slide();
        }
        self.segment_start = advance(self.segment_start, now, self.segment, elapsed);
    }

    fn available(&self) -> u32 {
        self.permit_limit.saturating_sub(self.total)
    }

    fn take(&mut self, permits: u32, _now: Instant) {
        self.segments[self.current] = self.segments[self.current].saturating_add(permits);
        self.total = self.total.saturating_add(permits);
    }

    fn rollback(&mut self, permits: u32, granted_at: Instant) {
        let len = self.segments.len();
        let index = if granted_at >= self.segment_start {
            self.current
        } else {
            let behind = self.segment_start.duration_since(granted_at).as_nanos();
            let back = behind.div_ceil(self.segment.as_nanos().max(1));
            if back >= len as u128 {
                return;
            }
            (self.current + len - back as usize) % len
        };

        let returned = permits.min(self.segments[index]);
        self.segments[index] -= returned;
        self.total = self.total.saturating_sub(returned);
    }

    fn next_replenishment(&self) -> Option<Instant> {
        self.segment_end()
    }

    fn retry_after(&self, permits: u32, now: Instant) -> Option<Duration> {
        let len = self.segments.len();
        let mut freed = self.available();
        for step in 1..=len {
            let evicted = (self.current + step) % len;
            freed = freed.saturating_add(self.segments[evicted]);
            if freed >= permits {
                let at = deadline(self.segment_start, self.segment, step as u32)?;
                return Some(at.saturating_duration_since(now));
            }
        }
        None
    }
}
