//! Token bucket limiter.

use std::time::Duration;
use tokio::time::Instant;

use super::algorithm::{advance, deadline, elapsed_periods, Algorithm};

/// A bucket of tokens refilled by a fixed amount every period.
///
/// With auto replenishment the refill is computed lazily from the time
/// elapsed since the last refill, so no timer task is needed. Without it
/// the bucket only refills through [`Algorithm::try_replenish`].
#[derive(Debug)]
pub struct TokenBucket {
    token_limit: u32,
    tokens_per_period: u32,
    period: Duration,
    auto_replenishment: bool,
    tokens: u32,
    last_replenish: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(
        token_limit: u32,
        tokens_per_period: u32,
        period: Duration,
        auto_replenishment: bool,
        now: Instant,
    ) -> Self {
        Self {
            token_limit,
            tokens_per_period,
            period,
            auto_replenishment,
            tokens: token_limit,
            last_replenish: now,
        }
    }

    /// Get the number of tokens currently in the bucket.
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    fn add_tokens(&mut self, tokens: u32) {
        self.tokens = self.tokens.saturating_add(tokens).min(self.token_limit);
    }
}

impl Algorithm for TokenBucket {
    fn kind(&self) -> &'static str {
        "token_bucket"
    }

    fn limit(&self) -> u32 {
        self.token_limit
    }

    fn replenish(&mut self, now: Instant) {
        if !self.auto_replenishment {
            return;
        }

        let periods = elapsed_periods(self.last_replenish, now, self.period);
        if periods > 0 {
            self.add_tokens(periods.saturating_mul(self.tokens_per_period));
            self.last_replenish = advance(self.last_replenish, now, self.period, periods);
        }
    }

    fn available(&self) -> u32 {
        self.tokens
    }

    fn take(&mut self, permits: u32, _now: Instant) {
        self.tokens = self.tokens.saturating_sub(permits);
    }

    fn rollback(&mut self, permits: u32, _granted_at: Instant) {
        self.add_tokens(permits);
    }

    fn next_replenishment(&self) -> Option<Instant> {
        if !self.auto_replenishment {
            return None;
        }
        deadline(self.last_replenish, self.period, 1)
    }

    fn retry_after(&self, permits: u32, now: Instant) -> Option<Duration> {
        let missing = permits.saturating_sub(self.tokens);
        if !self.auto_replenishment || missing == 0 {
            return None;
        }

        let periods = missing.div_ceil(self.tokens_per_period.max(1));
        let at = deadline(self.last_replenish, self.period, periods)?;
        Some(at.saturating_duration_since(now))
    }

    fn try_replenish(&mut self, now: Instant) -> bool {
        if self.auto_replenishment {
            return false;
        }

        self.add_tokens(self.tokens_per_period);
        self.last_replenish = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_full() {
        let bucket = TokenBucket::new(10, 4, Duration::from_secs(20), true, Instant::now());
        assert_eq!(bucket.tokens(), 10);
        assert_eq!(bucket.available(), 10);
    }

    #[test]
    fn test_replenishes_per_whole_period() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10, 4, Duration::from_secs(20), true, start);

        bucket.take(10, start);
        assert_eq!(bucket.available(), 0);

        bucket.replenish(start + Duration::from_secs(19));
        assert_eq!(bucket.tokens(), 0);

        bucket.replenish(start + Duration::from_secs(20));
        assert_eq!(bucket.tokens(), 4);

        // 41s is two periods after start; only one more period has elapsed.
        bucket.replenish(start + Duration::from_secs(41));
        assert_eq!(bucket.tokens(), 8);
    }

    #[test]
    fn test_replenish_is_capped() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10, 4, Duration::from_secs(20), true, start);

        bucket.take(3, start);
        bucket.replenish(start + Duration::from_secs(200));
        assert_eq!(bucket.tokens(), 10);
    }

    #[test]
    fn test_retry_after_counts_missing_periods() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10, 4, Duration::from_secs(20), true, start);

        bucket.take(10, start);
        let now = start + Duration::from_secs(5);
        assert_eq!(bucket.retry_after(1, now), Some(Duration::from_secs(15)));
        assert_eq!(bucket.retry_after(5, now), Some(Duration::from_secs(35)));
    }

    #[test]
    fn test_no_retry_hint_when_tokens_suffice() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10, 4, Duration::from_secs(20), true, start);

        bucket.take(7, start);
        assert_eq!(bucket.retry_after(3, start), None);
        assert_eq!(bucket.retry_after(4, start), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_unrepresentable_replenishment() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(1, 1, Duration::from_secs(u64::MAX / 2), true, start);

        bucket.take(1, start);
        bucket.replenish(start + Duration::from_secs(3600));
        assert_eq!(bucket.next_replenishment(), None);
        assert_eq!(bucket.retry_after(1, start), None);
    }

    #[test]
    fn test_manual_replenishment() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10, 4, Duration::from_secs(20), false, start);

        bucket.take(10, start);
        bucket.replenish(start + Duration::from_secs(100));
        assert_eq!(bucket.tokens(), 0);
        assert_eq!(bucket.next_replenishment(), None);
        assert_eq!(bucket.retry_after(1, start), None);

        assert!(bucket.try_replenish(start));
        assert_eq!(bucket.tokens(), 4);
    }

    #[test]
    fn test_try_replenish_refused_when_automatic() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10, 4, Duration::from_secs(20), true, start);

        bucket.take(5, start);
        assert!(!bucket.try_replenish(start));
        assert_eq!(bucket.tokens(), 5);
    }
}
