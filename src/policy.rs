//! Named limiting policies for wallet flows.
//!
//! Each sensitive flow gets its own limiter with its own limits. The limiters
//! are owned by a [`PolicySet`] that the service layer constructs and passes
//! to the handlers that need it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PoliciesConfig;
use crate::error::{Result, ThrottleError};
use crate::ratelimit::{Clock, LimiterConfig, RateLimiter, SystemClock};

/// A rate-limited wallet flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Credential checks
    Login,
    /// One-time password sends
    Otp,
    /// Payment submissions
    Payment,
    /// Password reset requests
    PasswordReset,
}

impl Policy {
    /// Every policy, in a stable order.
    pub const ALL: [Policy; 4] = [
        Policy::Login,
        Policy::Otp,
        Policy::Payment,
        Policy::PasswordReset,
    ];

    /// The built-in limits for this policy.
    pub fn default_config(&self) -> LimiterConfig {
        match self {
            Policy::Login => LimiterConfig::new(5, 60_000),
            Policy::Otp => LimiterConfig::new(5, 300_000),
            Policy::Payment => LimiterConfig::new(3, 60_000),
            Policy::PasswordReset => LimiterConfig::new(3, 1_800_000),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Login => "login",
            Policy::Otp => "OTP",
            Policy::Payment => "payment",
            Policy::PasswordReset => "password reset",
        };
        f.write_str(name)
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "login" => Ok(Policy::Login),
            "otp" => Ok(Policy::Otp),
            "payment" => Ok(Policy::Payment),
            "password_reset" => Ok(Policy::PasswordReset),
            other => Err(format!(
                "unknown policy '{}' (expected login, otp, payment or password-reset)",
                other
            )),
        }
    }
}

/// One running limiter per policy.
#[derive(Debug, Clone)]
pub struct PolicySet {
    login: Arc<RateLimiter>,
    otp: Arc<RateLimiter>,
    payment: Arc<RateLimiter>,
    password_reset: Arc<RateLimiter>,
}

impl PolicySet {
    /// Build every limiter on the system clock and start their sweeps.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(config: &PoliciesConfig) -> Result<Self> {
        Self::spawn_with_clock(config, Arc::new(SystemClock))
    }

    /// Build every limiter on a shared clock and start their sweeps.
    pub fn spawn_with_clock(config: &PoliciesConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let build = |policy: Policy| {
            RateLimiter::spawn_with_clock(config.get(policy), clock.clone()).map_err(|e| match e {
                ThrottleError::InvalidConfiguration(msg) => {
                    ThrottleError::InvalidConfiguration(format!("{} policy: {}", policy, msg))
                }
                other => other,
            })
        };

        let set = Self {
            login: build(Policy::Login)?,
            otp: build(Policy::Otp)?,
            payment: build(Policy::Payment)?,
            password_reset: build(Policy::PasswordReset)?,
        };
        info!("Policy limiters initialized");
        Ok(set)
    }

    /// Get the limiter for a policy.
    pub fn limiter(&self, policy: Policy) -> &Arc<RateLimiter> {
        match policy {
            Policy::Login => &self.login,
            Policy::Otp => &self.otp,
            Policy::Payment => &self.payment,
            Policy::PasswordReset => &self.password_reset,
        }
    }

    /// Record an attempt for `key` under `policy`.
    ///
    /// Returns [`ThrottleError::RateLimited`] with the wait time if the
    /// attempt was rejected.
    pub fn check(&self, policy: Policy, key: &str) -> Result<()> {
        let Err(retry_after) = self.limiter(policy).try_acquire(key) else {
            return Ok(());
        };

        debug!(
            policy = %policy,
            key = %key,
            retry_after_ms = retry_after.as_millis() as u64,
            "Attempt throttled"
        );
        Err(ThrottleError::RateLimited {
            policy,
            retry_after,
        })
    }

    /// Stop every limiter's background sweep.
    pub async fn shutdown(&self) {
        futures::future::join_all(Policy::ALL.iter().map(|&p| self.limiter(p).stop())).await;
        info!("Policy limiters stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_default_limits() {
        assert_eq!(Policy::Login.default_config(), LimiterConfig::new(5, 60_000));
        assert_eq!(Policy::Payment.default_config(), LimiterConfig::new(3, 60_000));
        assert_eq!(Policy::Otp.default_config(), LimiterConfig::new(5, 300_000));
        assert_eq!(
            Policy::PasswordReset.default_config(),
            LimiterConfig::new(3, 1_800_000)
        );
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: Policy = serde_yaml::from_str("password_reset").unwrap();
        assert_eq!(policy, Policy::PasswordReset);
        assert_eq!(serde_json::to_string(&Policy::Otp).unwrap(), "\"otp\"");
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("password-reset".parse::<Policy>(), Ok(Policy::PasswordReset));
        assert_eq!("OTP".parse::<Policy>(), Ok(Policy::Otp));
        assert!("transfer".parse::<Policy>().is_err());
    }

    #[tokio::test]
    async fn test_policies_are_independent() {
        let clock = ManualClock::new(0);
        let set = PolicySet::spawn_with_clock(&PoliciesConfig::default(), Arc::new(clock)).unwrap();

        for _ in 0..3 {
            set.check(Policy::Payment, "user-1").unwrap();
        }
        assert!(set.check(Policy::Payment, "user-1").is_err());
        // Same key, different policy
        set.check(Policy::Login, "user-1").unwrap();

        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_check_reports_wait_time() {
        let clock = ManualClock::new(0);
        let set =
            PolicySet::spawn_with_clock(&PoliciesConfig::default(), Arc::new(clock.clone())).unwrap();

        for _ in 0..5 {
            set.check(Policy::Login, "9876543210").unwrap();
        }
        clock.advance(Duration::from_millis(15_000));

        match set.check(Policy::Login, "9876543210") {
            Err(ThrottleError::RateLimited {
                policy,
                retry_after,
            }) => {
                assert_eq!(policy, Policy::Login);
                assert_eq!(retry_after, Duration::from_millis(45_000));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }

        set.shutdown().await;
        assert!(!set.limiter(Policy::Login).is_sweeping());
    }

    #[tokio::test]
    async fn test_wait_time_never_zero() {
        let clock = ManualClock::new(0);
        let set =
            PolicySet::spawn_with_clock(&PoliciesConfig::default(), Arc::new(clock.clone())).unwrap();

        for _ in 0..3 {
            set.check(Policy::Payment, "user-1").unwrap();
        }
        clock.advance(Duration::from_millis(59_999));

        let err = set.check(Policy::Payment, "user-1").unwrap_err();
        match &err {
            ThrottleError::RateLimited { retry_after, .. } => {
                assert_eq!(*retry_after, Duration::from_millis(1));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "Too many payment attempts. Please wait 1 seconds."
        );

        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_policy_config_names_policy() {
        let mut config = PoliciesConfig::default();
        config.otp.max_attempts = 0;

        let err = PolicySet::spawn(&config).unwrap_err();
        assert!(err.to_string().contains("OTP policy"));
    }
}
