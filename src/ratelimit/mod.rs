//! Admission control: rate limiting algorithms, limiters and the policy registry.

mod algorithm;
mod concurrency;
mod fixed_window;
mod limiter;
mod policy;
mod registry;
mod sliding_window;
mod token_bucket;

pub use algorithm::Algorithm;
pub use concurrency::ConcurrencyLimit;
pub use fixed_window::FixedWindow;
pub use limiter::{Admission, LimiterStatistics, PermitLease, RateLimiter, RejectReason, Rejection};
pub use policy::{default_policies, AlgorithmConfig, PolicyConfig};
pub use registry::PolicyRegistry;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;
