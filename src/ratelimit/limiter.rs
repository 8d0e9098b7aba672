//! Per-policy rate limiter: admission decisions, waiter queue and leases.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::algorithm::Algorithm;
use super::policy::PolicyConfig;
use crate::error::{Result, TurnstileError};

/// Why an acquisition attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No capacity now and the attempt was not allowed to queue.
    Exhausted,
    /// No capacity now and the queue is full.
    QueueFull,
    /// More permits were asked for than the policy can ever grant.
    ExceedsLimit,
}

/// An over-limit outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The policy that rejected the attempt
    pub policy: String,
    pub reason: RejectReason,
    /// Earliest time a retry could succeed, when the algorithm can tell
    pub retry_after: Option<Duration>,
}

/// The result of an acquisition attempt.
#[derive(Debug)]
pub enum Admission {
    Granted(PermitLease),
    Rejected(Rejection),
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted(_))
    }

    /// Get the lease, dropping the rejection if there is none.
    pub fn into_lease(self) -> Option<PermitLease> {
        match self {
            Admission::Granted(lease) => Some(lease),
            Admission::Rejected(_) => None,
        }
    }
}

/// A point-in-time view of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimiterStatistics {
    pub available_permits: u32,
    pub outstanding_permits: u32,
    pub queued_permits: u32,
    pub total_successful: u64,
    pub total_failed: u64,
}

/// A caller suspended until capacity frees up.
struct Waiter {
    id: u64,
    permits: u32,
    tx: oneshot::Sender<PermitLease>,
}

struct State {
    algorithm: Box<dyn Algorithm>,
    /// Oldest waiter first
    queue: VecDeque<Waiter>,
    queued_permits: u32,
    next_waiter_id: u64,
    total_successful: u64,
    total_failed: u64,
}

struct Shared {
    name: String,
    kind: &'static str,
    limit: u32,
    queue_limit: u32,
    state: Mutex<State>,
}

impl Shared {
    fn lease(self: &Arc<Self>, permits: u32, granted_at: Instant) -> PermitLease {
        PermitLease {
            shared: Arc::clone(self),
            permits,
            granted_at,
        }
    }

    /// Roll the algorithm forward and hand permits to queued callers in order.
    fn drain(self: &Arc<Self>, state: &mut State, now: Instant) {
        state.algorithm.replenish(now);

        while let Some(front) = state.queue.front() {
            if front.permits > state.algorithm.available() {
                break;
            }
            let Some(waiter) = state.queue.pop_front() else {
                break;
            };

            state.queued_permits -= waiter.permits;
            state.algorithm.take(waiter.permits, now);

            match waiter.tx.send(self.lease(waiter.permits, now)) {
                Ok(()) => {
                    state.total_successful += 1;
                    trace!(
                        policy = %self.name,
                        permits = waiter.permits,
                        queued = state.queued_permits,
                        "Granted queued acquisition"
                    );
                }
                Err(mut lease) => {
                    // The waiter went away between its last poll and now.
                    let permits = lease.disarm();
                    state.algorithm.rollback(permits, now);
                }
            }
        }
    }

    fn pump(self: &Arc<Self>) {
        let mut state = self.state.lock();
        let now = Instant::now();
        self.drain(&mut state, now);
    }

    fn release(self: &Arc<Self>, permits: u32) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.algorithm.release(permits);
        self.drain(&mut state, now);
    }

    fn next_replenishment(&self) -> Option<Instant> {
        self.state.lock().algorithm.next_replenishment()
    }

    /// Grant immediately if the request can be decided without queueing.
    ///
    /// Returns `None` when the caller would have to wait.
    fn try_grant(self: &Arc<Self>, state: &mut State, permits: u32, now: Instant) -> Option<Admission> {
        if permits > self.limit {
            return Some(self.reject(state, RejectReason::ExceedsLimit, permits, now));
        }

        self.drain(state, now);
        let available = state.algorithm.available();

        if permits == 0 {
            // Zero permits: succeeds while there is capacity, never queues.
            return Some(if available > 0 && state.queue.is_empty() {
                Admission::Granted(self.lease(0, now))
            } else {
                self.reject(state, RejectReason::Exhausted, permits, now)
            });
        }

        if state.queue.is_empty() && available >= permits {
            state.algorithm.take(permits, now);
            state.total_successful += 1;
            trace!(
                policy = %self.name,
                permits = permits,
                available = available - permits,
                "Granted acquisition"
            );
            return Some(Admission::Granted(self.lease(permits, now)));
        }

        None
    }

    fn reject(&self, state: &mut State, reason: RejectReason, permits: u32, now: Instant) -> Admission {
        state.total_failed += 1;
        // Queued callers are served first, so their permits count as ahead of this one.
        let retry_after = match reason {
            RejectReason::ExceedsLimit => None,
            _ => state
                .algorithm
                .retry_after(permits.max(1).saturating_add(state.queued_permits), now),
        };

        debug!(
            policy = %self.name,
            permits = permits,
            reason = ?reason,
            queued = state.queued_permits,
            "Rate limit exceeded"
        );

        Admission::Rejected(Rejection {
            policy: self.name.clone(),
            reason,
            retry_after,
        })
    }
}

/// A held grant of permits.
///
/// Dropping the lease releases it. For the concurrency limiter that
/// returns capacity to the pool; time-based limiters consider the permits
/// consumed and free capacity as time passes.
pub struct PermitLease {
    shared: Arc<Shared>,
    permits: u32,
    granted_at: Instant,
}

impl PermitLease {
    /// Get the number of permits held by this lease.
    pub fn permits(&self) -> u32 {
        self.permits
    }

    /// Detach the permits so dropping the lease does not release them.
    fn disarm(&mut self) -> u32 {
        std::mem::take(&mut self.permits)
    }
}

impl Drop for PermitLease {
    fn drop(&mut self) {
        if self.permits > 0 {
            let permits = self.disarm();
            self.shared.release(permits);
        }
    }
}

impl fmt::Debug for PermitLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermitLease")
            .field("policy", &self.shared.name)
            .field("permits", &self.permits)
            .finish()
    }
}

/// A queued acquisition. Dropping it before completion cancels the wait.
struct QueuedAcquisition {
    shared: Arc<Shared>,
    id: u64,
    rx: oneshot::Receiver<PermitLease>,
    done: bool,
}

impl QueuedAcquisition {
    fn complete(&mut self, outcome: std::result::Result<PermitLease, oneshot::error::RecvError>) -> Admission {
        self.done = true;
        match outcome {
            Ok(lease) => Admission::Granted(lease),
            Err(_) => Admission::Rejected(Rejection {
                policy: self.shared.name.clone(),
                reason: RejectReason::Exhausted,
                retry_after: None,
            }),
        }
    }
}

impl Drop for QueuedAcquisition {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        let mut state = self.shared.state.lock();
        let now = Instant::now();

        if let Some(position) = state.queue.iter().position(|w| w.id == self.id) {
            if let Some(waiter) = state.queue.remove(position) {
                state.queued_permits -= waiter.permits;
            }
            debug!(policy = %self.shared.name, "Queued acquisition cancelled");
        } else if let Ok(mut lease) = self.rx.try_recv() {
            // Granted under the lock after our last poll; undo it.
            let permits = lease.disarm();
            state.algorithm.rollback(permits, lease.granted_at);
            state.total_successful = state.total_successful.saturating_sub(1);
            debug!(policy = %self.shared.name, "Rolled back grant to cancelled acquisition");
        }

        // Removing a waiter may unblock the ones behind it.
        self.shared.drain(&mut state, now);
    }
}

enum Enqueued {
    Decided(Admission),
    Queued(QueuedAcquisition),
}

/// A rate limiter for one policy.
///
/// Cloning is cheap and clones share state. All state lives behind a
/// single per-policy lock that is never held across an await point.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Build a limiter for a policy.
    pub fn from_policy(policy: &PolicyConfig) -> Result<Self> {
        policy.validate()?;
        let algorithm = policy.algorithm.build(Instant::now());
        Ok(Self::with_algorithm(&policy.name, policy.queue_limit, algorithm))
    }

    /// Build a limiter around any algorithm.
    pub fn with_algorithm(name: &str, queue_limit: u32, algorithm: Box<dyn Algorithm>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.to_string(),
                kind: algorithm.kind(),
                limit: algorithm.limit(),
                queue_limit,
                state: Mutex::new(State {
                    algorithm,
                    queue: VecDeque::new(),
                    queued_permits: 0,
                    next_waiter_id: 0,
                    total_successful: 0,
                    total_failed: 0,
                }),
            }),
        }
    }

    /// Get the policy name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Get the algorithm name.
    pub fn kind(&self) -> &'static str {
        self.shared.kind
    }

    /// Get the maximum number of outstanding permits.
    pub fn permit_limit(&self) -> u32 {
        self.shared.limit
    }

    pub fn queue_limit(&self) -> u32 {
        self.shared.queue_limit
    }

    /// Whether both handles share the same state.
    pub fn same_instance(&self, other: &RateLimiter) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Try to acquire permits without waiting.
    pub fn attempt_acquire(&self, permits: u32) -> Admission {
        let mut state = self.shared.state.lock();
        let now = Instant::now();
        match self.shared.try_grant(&mut state, permits, now) {
            Some(admission) => admission,
            None => self
                .shared
                .reject(&mut state, RejectReason::Exhausted, permits, now),
        }
    }

    /// Acquire permits, queueing if the policy allows it.
    ///
    /// A queued caller is suspended until it is granted. Dropping the
    /// returned future cancels the wait without consuming capacity.
    pub async fn acquire(&self, permits: u32) -> Admission {
        let mut waiter = match self.enqueue(permits) {
            Enqueued::Decided(admission) => return admission,
            Enqueued::Queued(waiter) => waiter,
        };

        let outcome = loop {
            match self.shared.next_replenishment() {
                Some(at) => {
                    let woke = tokio::select! {
                        biased;
                        outcome = &mut waiter.rx => Some(outcome),
                        _ = tokio::time::sleep_until(at) => None,
                    };
                    match woke {
                        Some(outcome) => break outcome,
                        None => self.shared.pump(),
                    }
                }
                None => break (&mut waiter.rx).await,
            }
        };

        waiter.complete(outcome)
    }

    /// Acquire permits, giving up after `timeout` in the queue.
    pub async fn acquire_timeout(&self, permits: u32, timeout: Duration) -> Result<Admission> {
        tokio::time::timeout(timeout, self.acquire(permits))
            .await
            .map_err(|_| {
                debug!(policy = %self.shared.name, timeout = ?timeout, "Acquisition timed out");
                TurnstileError::Cancelled {
                    policy: self.shared.name.clone(),
                }
            })
    }

    /// Trigger an external replenishment.
    ///
    /// Returns `false` if the algorithm replenishes automatically or has
    /// nothing to replenish.
    pub fn replenish(&self) -> bool {
        let mut state = self.shared.state.lock();
        let now = Instant::now();
        let replenished = state.algorithm.try_replenish(now);
        if replenished {
            self.shared.drain(&mut state, now);
        }
        replenished
    }

    /// Get a snapshot of the limiter's counters.
    pub fn statistics(&self) -> LimiterStatistics {
        let mut state = self.shared.state.lock();
        let now = Instant::now();
        self.shared.drain(&mut state, now);

        let available = state.algorithm.available();
        LimiterStatistics {
            available_permits: available,
            outstanding_permits: self.shared.limit.saturating_sub(available),
            queued_permits: state.queued_permits,
            total_successful: state.total_successful,
            total_failed: state.total_failed,
        }
    }

    fn enqueue(&self, permits: u32) -> Enqueued {
        let mut state = self.shared.state.lock();
        let now = Instant::now();

        if let Some(admission) = self.shared.try_grant(&mut state, permits, now) {
            return Enqueued::Decided(admission);
        }

        if state.queued_permits.saturating_add(permits) > self.shared.queue_limit {
            return Enqueued::Decided(
                self.shared
                    .reject(&mut state, RejectReason::QueueFull, permits, now),
            );
        }

        let id = state.next_waiter_id;
        state.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        state.queue.push_back(Waiter { id, permits, tx });
        state.queued_permits += permits;

        trace!(
            policy = %self.shared.name,
            permits = permits,
            queued = state.queued_permits,
            "Queued acquisition"
        );

        Enqueued::Queued(QueuedAcquisition {
            shared: Arc::clone(&self.shared),
            id,
            rx,
            done: false,
        })
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.shared.name)
            .field("kind", &self.shared.kind)
            .field("limit", &self.shared.limit)
            .field("queue_limit", &self.shared.queue_limit)
            .finish()
    }
}
