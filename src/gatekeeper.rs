//! Throttled wallet flows.
//!
//! The gatekeeper sits in front of the wallet backend and consults the
//! matching policy before every sensitive call. Rejected attempts never reach
//! the backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::error::{Result, ThrottleError};
use crate::policy::{Policy, PolicySet};

/// The wallet service the gatekeeper protects.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Check a phone number and password pair.
    async fn verify_credentials(&self, phone: &str, password: &str) -> Result<bool>;

    /// Send a one-time password to a phone number.
    async fn send_otp(&self, phone: &str) -> Result<()>;

    /// Submit a payment, returning its reference.
    async fn submit_payment(&self, user_id: &str, amount_minor: u64) -> Result<String>;

    /// Start a password reset for a phone number.
    async fn send_password_reset(&self, phone: &str) -> Result<()>;
}

/// Applies the policy limits to wallet flows.
pub struct Gatekeeper<B: WalletBackend> {
    backend: Arc<B>,
    policies: PolicySet,
}

impl<B: WalletBackend> Gatekeeper<B> {
    /// Create a gatekeeper over a backend and a set of policy limiters.
    pub fn new(backend: Arc<B>, policies: PolicySet) -> Self {
        Self { backend, policies }
    }

    /// The policy limiters in use.
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Log in with a phone number and password.
    ///
    /// A successful login clears the phone's failed attempts.
    #[instrument(skip(self, password))]
    pub async fn login(&self, phone: &str, password: &str) -> Result<()> {
        self.policies.check(Policy::Login, phone)?;

        if !self.backend.verify_credentials(phone, password).await? {
            warn!(phone = %phone, "Login rejected by backend");
            return Err(ThrottleError::InvalidCredentials);
        }

        self.policies.limiter(Policy::Login).reset(phone);
        info!(phone = %phone, "Login succeeded");
        Ok(())
    }

    /// Send a one-time password.
    #[instrument(skip(self))]
    pub async fn request_otp(&self, phone: &str) -> Result<()> {
        self.policies.check(Policy::Otp, &format!("otp:{}", phone))?;
        self.backend.send_otp(phone).await
    }

    /// Submit a payment on behalf of a user.
    #[instrument(skip(self))]
    pub async fn submit_payment(&self, user_id: &str, amount_minor: u64) -> Result<String> {
        self.policies.check(Policy::Payment, user_id)?;
        let reference = self.backend.submit_payment(user_id, amount_minor).await?;
        info!(user_id = %user_id, reference = %reference, "Payment submitted");
        Ok(reference)
    }

    /// Start a password reset.
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, phone: &str) -> Result<()> {
        self.policies.check(Policy::PasswordReset, phone)?;
        self.backend.send_password_reset(phone).await
    }
}
