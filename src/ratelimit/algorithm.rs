//! The state machine every limiter algorithm implements.
//!
//! An [`Algorithm`] only does bookkeeping: it never blocks and never sees
//! the waiter queue. [`RateLimiter`](super::RateLimiter) wraps it in a lock,
//! makes the admission decision and services queued callers.

use std::time::Duration;
use tokio::time::Instant;

/// Permit accounting for one rate limiting policy.
pub trait Algorithm: Send {
    /// Short name used in logs and statistics.
    fn kind(&self) -> &'static str;

    /// Maximum number of permits that can be outstanding at once.
    fn limit(&self) -> u32;

    /// Roll time-based state forward to `now`.
    fn replenish(&mut self, now: Instant);

    /// Permits that can be handed out right now.
    fn available(&self) -> u32;

    /// Record `permits` as issued. Callers check [`available`](Self::available) first.
    fn take(&mut self, permits: u32, now: Instant);

    /// Called when a lease is dropped. Only algorithms that give capacity
    /// back on completion do anything here.
    fn release(&mut self, _permits: u32) {}

    /// Undo a grant that never reached its caller.
    fn rollback(&mut self, permits: u32, granted_at: Instant);

    /// Instant at which time-based replenishment next frees capacity.
    fn next_replenishment(&self) -> Option<Instant>;

    /// How long a caller asking for `permits` should wait, if it can be known.
    fn retry_after(&self, permits: u32, now: Instant) -> Option<Duration>;

    /// Externally triggered replenishment. Returns `false` when the
    /// algorithm replenishes on its own or has no notion of it.
    fn try_replenish(&mut self, _now: Instant) -> bool {
        false
    }
}

/// Number of whole `period`s between `from` and `now`.
pub(crate) fn elapsed_periods(from: Instant, now: Instant, period: Duration) -> u32 {
    let elapsed = now.saturating_duration_since(from).as_nanos();
    let periods = elapsed / period.as_nanos().max(1);
    u32::try_from(periods).unwrap_or(u32::MAX)
}

/// The instant `periods` whole periods after `from`, if it is representable.
pub(crate) fn deadline(from: Instant, period: Duration, periods: u32) -> Option<Instant> {
    period.checked_mul(periods).and_then(|d| from.checked_add(d))
}

/// Move `from` forward by `periods` whole periods, keeping boundaries aligned.
pub(crate) fn advance(from: Instant, now: Instant, period: Duration, periods: u32) -> Instant {
    deadline(from, period, periods).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_periods_counts_whole_periods() {
        let start = Instant::now();
        let period = Duration::from_secs(10);

        assert_eq!(elapsed_periods(start, start, period), 0);
        assert_eq!(elapsed_periods(start, start + Duration::from_secs(9), period), 0);
        assert_eq!(elapsed_periods(start, start + Duration::from_secs(10), period), 1);
        assert_eq!(elapsed_periods(start, start + Duration::from_secs(35), period), 3);
    }

    #[test]
    fn test_advance_stays_on_boundary() {
        let start = Instant::now();
        let period = Duration::from_secs(10);
        let now = start + Duration::from_secs(35);

        let next = advance(start, now, period, elapsed_periods(start, now, period));
        assert_eq!(next, start + Duration::from_secs(30));
    }

    #[test]
    fn test_deadline_overflow_is_none() {
        let start = Instant::now();
        let period = Duration::from_secs(u64::MAX / 2);

        assert_eq!(deadline(start, Duration::from_secs(10), 2), Some(start + Duration::from_secs(20)));
        assert_eq!(deadline(start, period, 1), None);
        assert_eq!(deadline(start, period, 3), None);
    }
}
