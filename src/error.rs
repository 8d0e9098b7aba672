//! Error types for the Turnstile service.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Over-limit decisions are not errors; they are reported through
/// [`Admission::Rejected`](crate::ratelimit::Admission::Rejected).
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy with this name is already registered
    #[error("Rate limit policy '{0}' is already registered")]
    DuplicatePolicy(String),

    /// No policy with this name is registered
    #[error("Unknown rate limit policy '{0}'")]
    UnknownPolicy(String),

    /// A queued acquisition was abandoned before a permit was granted
    #[error("Acquisition on policy '{policy}' was cancelled while queued")]
    Cancelled { policy: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
