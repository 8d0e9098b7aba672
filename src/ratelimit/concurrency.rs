//! Concurrency limiter.

use std::time::Duration;
use tokio::time::Instant;

use super::algorithm::Algorithm;

/// Bounds the number of leases held at the same time.
///
/// There is no time dimension: capacity only comes back when a lease is
/// released.
#[derive(Debug)]
pub struct ConcurrencyLimit {
    permit_limit: u32,
    held: u32,
}

impl ConcurrencyLimit {
    pub fn new(permit_limit: u32) -> Self {
        Self {
            permit_limit,
            held: 0,
        }
    }

    /// Get the number of permits currently held.
    pub fn held(&self) -> u32 {
        self.held
    }
}

impl Algorithm for ConcurrencyLimit {
    fn kind(&self) -> &'static str {
        "concurrency"
    }

    fn limit(&self) -> u32 {
        self.permit_limit
    }

    fn replenish(&mut self, _now: Instant) {}

    fn available(&self) -> u32 {
        self.permit_limit.saturating_sub(self.held)
    }

    fn take(&mut self, permits: u32, _now: Instant) {
        self.held = self.held.saturating_add(permits);
    }

    fn release(&mut self, permits: u32) {
        self.held = self.held.saturating_sub(permits);
    }

    fn rollback(&mut self, permits: u32, _granted_at: Instant) {
        self.release(permits);
    }

    fn next_replenishment(&self) -> Option<Instant> {
        None
    }

    fn retry_after(&self, _permits: u32, _now: Instant) -> Option<Duration> {
        None
    }
}
