//! Error types for wallet-throttle.

use std::time::Duration;

use thiserror::Error;

use crate::policy::Policy;

/// Main error type for wallet-throttle operations.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// A limiter was constructed with a zero limit, window or sweep interval
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The attempt was rejected by the policy's limiter
    #[error("Too many {policy} attempts. Please wait {} seconds.", wait_secs(.retry_after))]
    RateLimited {
        /// Policy that rejected the attempt
        policy: Policy,
        /// Time until the oldest counted attempt leaves the window
        retry_after: Duration,
    },

    /// The backend rejected the supplied credentials
    #[error("Invalid phone number or password")]
    InvalidCredentials,

    /// The wallet backend failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Whole seconds a caller has to wait, rounded up so "0 seconds" is never shown
/// for a pending wait.
fn wait_secs(retry_after: &Duration) -> u64 {
    let millis = retry_after.as_millis() as u64;
    millis.div_ceil(1000)
}

/// Result type alias for wallet-throttle operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message_rounds_up() {
        let err = ThrottleError::RateLimited {
            policy: Policy::Login,
            retry_after: Duration::from_millis(41_200),
        };
        assert_eq!(
            err.to_string(),
            "Too many login attempts. Please wait 42 seconds."
        );
    }

    #[test]
    fn test_rate_limited_message_exact_seconds() {
        let err = ThrottleError::RateLimited {
            policy: Policy::PasswordReset,
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "Too many password reset attempts. Please wait 30 seconds."
        );
    }
}
