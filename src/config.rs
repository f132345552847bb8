//! Configuration management for wallet-throttle.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, ThrottleError};
use crate::policy::Policy;
use crate::ratelimit::LimiterConfig;

/// Main configuration for wallet-throttle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Per-policy limiter configuration
    #[serde(default)]
    pub policies: PoliciesConfig,
}

/// Limiter configuration for each policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliciesConfig {
    #[serde(default = "default_login")]
    pub login: LimiterConfig,

    #[serde(default = "default_otp")]
    pub otp: LimiterConfig,

    #[serde(default = "default_payment")]
    pub payment: LimiterConfig,

    #[serde(default = "default_password_reset")]
    pub password_reset: LimiterConfig,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            login: default_login(),
            otp: default_otp(),
            payment: default_payment(),
            password_reset: default_password_reset(),
        }
    }
}

fn default_login() -> LimiterConfig {
    Policy::Login.default_config()
}

fn default_otp() -> LimiterConfig {
    Policy::Otp.default_config()
}

fn default_payment() -> LimiterConfig {
    Policy::Payment.default_config()
}

fn default_password_reset() -> LimiterConfig {
    Policy::PasswordReset.default_config()
}

impl PoliciesConfig {
    /// Get the limiter configuration for a policy.
    pub fn get(&self, policy: Policy) -> LimiterConfig {
        match policy {
            Policy::Login => self.login,
            Policy::Otp => self.otp,
            Policy::Payment => self.payment,
            Policy::PasswordReset => self.password_reset,
        }
    }
}

impl ThrottleConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse throttle config: {}", e)))
    }
}
