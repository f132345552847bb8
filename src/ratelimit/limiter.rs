//! Core sliding-window rate limiter.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock};
use super::sweeper::SweepHandle;
use super::window::AttemptLog;
use crate::error::{Result, ThrottleError};

/// Default period between background sweeps (5 minutes).
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Configuration for a single rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum attempts allowed per key within the window
    pub max_attempts: u32,
    /// Sliding window length in milliseconds
    pub window_ms: u64,
    /// Period between sweeps that evict idle keys, in milliseconds
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

fn default_cleanup_interval_ms() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_MS
}

impl LimiterConfig {
    /// Create a config with the default sweep interval.
    pub fn new(max_attempts: u32, window_ms: u64) -> Self {
        Self {
            max_attempts,
            window_ms,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
        }
    }

    /// Override the sweep interval.
    pub fn with_cleanup_interval_ms(mut self, cleanup_interval_ms: u64) -> Self {
        self.cleanup_interval_ms = cleanup_interval_ms;
        self
    }

    /// Reject zero limits, windows and sweep intervals.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ThrottleError::InvalidConfiguration(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.window_ms == 0 {
            return Err(ThrottleError::InvalidConfiguration(
                "window_ms must be greater than 0".into(),
            ));
        }
        if self.cleanup_interval_ms == 0 {
            return Err(ThrottleError::InvalidConfiguration(
                "cleanup_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Snapshot of a key's state, for debugging and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryDetails {
    /// The key this snapshot describes
    pub key: String,
    /// Attempt timestamps still inside the window, in milliseconds
    pub active_timestamps: Vec<u64>,
    /// Whether the next attempt would be rejected
    pub is_blocked: bool,
    /// When the oldest active attempt leaves the window, if blocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<u64>,
}

/// A sliding-window rate limiter keyed by arbitrary strings.
///
/// Each key may make at most `max_attempts` allowed attempts in any trailing
/// window of `window_ms`. Only allowed attempts are recorded; a rejected
/// attempt does not extend the block.
///
/// This struct is thread-safe. Each key's log is guarded by its map shard, so
/// concurrent [`is_allowed`](Self::is_allowed) calls on one key are
/// serialized.
pub struct RateLimiter {
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    /// Attempt logs indexed by key
    attempts: DashMap<String, AttemptLog>,
    /// Background sweep, if one was started
    sweeper: Mutex<Option<SweepHandle>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("tracked_keys", &self.attempts.len())
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}

impl RateLimiter {
    /// Create a limiter on the system clock, without a background sweep.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on the given clock, without a background sweep.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            attempts: DashMap::new(),
            sweeper: Mutex::new(None),
        })
    }

    /// Create a limiter on the system clock and start its background sweep.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(config: LimiterConfig) -> Result<Arc<Self>> {
        Self::spawn_with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on the given clock and start its background sweep.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn_with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let limiter = Arc::new(Self::with_clock(config, clock)?);

        let period = Duration::from_millis(config.cleanup_interval_ms);
        let handle = SweepHandle::spawn(Arc::downgrade(&limiter), period);
        *limiter.sweeper.lock() = Some(handle);

        info!(
            max_attempts = config.max_attempts,
            window_ms = config.window_ms,
            cleanup_interval_ms = config.cleanup_interval_ms,
            "Rate limiter started"
        );
        Ok(limiter)
    }

    /// Get the configuration of this limiter.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Check whether an attempt for `key` is allowed right now.
    ///
    /// An allowed attempt is recorded; a rejected one is not. Expired
    /// attempts for the key are pruned either way.
    pub fn is_allowed(&self, key: &str) -> bool {
        self.try_acquire(key).is_ok()
    }

    /// Record an attempt for `key`, or return how long until one is allowed.
    ///
    /// The wait is computed under the same lock as the decision, so it is
    /// never zero for a rejected attempt.
    pub fn try_acquire(&self, key: &str) -> std::result::Result<(), Duration> {
        let window_ms = self.config.window_ms;
        let max_attempts = self.config.max_attempts as usize;

        let mut log = match self.attempts.get_mut(key) {
            Some(log) => log,
            None => self
                .attempts
                .entry(key.to_owned())
                .or_insert_with(|| AttemptLog::with_capacity(self.config.max_attempts)),
        };

        // Read the clock under the shard lock so a key's timestamps stay ordered.
        let now = self.clock.now_ms();
        log.prune(now, window_ms);

        if log.len() >= max_attempts {
            let oldest = log.oldest_active(now, window_ms).unwrap_or(now);
            let wait_ms = window_ms.saturating_sub(now.saturating_sub(oldest)).max(1);
            debug!(
                key = %key,
                attempts = log.len(),
                max_attempts = max_attempts,
                retry_after_ms = wait_ms,
                "Rate limit exceeded"
            );
            return Err(Duration::from_millis(wait_ms));
        }

        log.push(now);
        trace!(key = %key, attempts = log.len(), "Attempt allowed");
        Ok(())
    }

    /// Time until the oldest active attempt for `key` leaves the window.
    ///
    /// Zero when the key has no active attempts.
    pub fn remaining_time(&self, key: &str) -> Duration {
        let window_ms = self.config.window_ms;
        let Some(log) = self.attempts.get(key) else {
            return Duration::ZERO;
        };

        let now = self.clock.now_ms();
        match log.oldest_active(now, window_ms) {
            Some(oldest) => {
                Duration::from_millis(window_ms.saturating_sub(now.saturating_sub(oldest)))
            }
            None => Duration::ZERO,
        }
    }

    /// Number of active attempts for `key`.
    pub fn attempt_count(&self, key: &str) -> u32 {
        let now = self.clock.now_ms();
        self.attempts
            .get(key)
            .map(|log| log.active_count(now, self.config.window_ms) as u32)
            .unwrap_or(0)
    }

    /// Forget every attempt for `key`.
    pub fn reset(&self, key: &str) {
        if self.attempts.remove(key).is_some() {
            debug!(key = %key, "Rate limit reset");
        }
    }

    /// Forget every key.
    ///
    /// This is primarily useful for testing.
    pub fn clear_all(&self) {
        self.attempts.clear();
    }

    /// Describe the current state of `key`.
    pub fn entry_details(&self, key: &str) -> EntryDetails {
        let now = self.clock.now_ms();
        let window_ms = self.config.window_ms;

        let active_timestamps: Vec<u64> = self
            .attempts
            .get(key)
            .map(|log| log.active(now, window_ms).collect())
            .unwrap_or_default();

        let is_blocked = active_timestamps.len() >= self.config.max_attempts as usize;
        let blocked_until = if is_blocked {
            active_timestamps
                .iter()
                .min()
                .map(|oldest| oldest.saturating_add(window_ms))
        } else {
            None
        };

        EntryDetails {
            key: key.to_owned(),
            active_timestamps,
            is_blocked,
            blocked_until,
        }
    }

    /// Prune expired attempts from every key and drop keys left empty.
    ///
    /// Returns the number of keys removed. Decisions never depend on this
    /// having run; it only bounds memory.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let window_ms = self.config.window_ms;
        let mut pruned = 0;
        let mut removed = 0;

        self.attempts.retain(|_, log| {
            pruned += log.prune(now, window_ms);
            if log.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });

        debug!(
            pruned_attempts = pruned,
            removed_keys = removed,
            tracked_keys = self.attempts.len(),
            "Sweep complete"
        );
        removed
    }

    /// Get the number of keys currently held in memory.
    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }

    /// Whether a background sweep is attached to this limiter.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Stop the background sweep and wait for it to finish.
    ///
    /// Safe to call more than once, and on limiters that never started one.
    pub async fn stop(&self) {
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!(
                max_attempts = self.config.max_attempts,
                window_ms = self.config.window_ms,
                "Rate limiter sweep stopped"
            );
        }
    }
}
