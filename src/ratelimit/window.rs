//! Sliding window attempt log.

use std::collections::VecDeque;

/// The recorded attempts for a single key, oldest first.
///
/// Timestamps are appended in the order the attempts were allowed. Only
/// allowed attempts are recorded, so the log never holds more than the
/// limiter's `max_attempts` entries.
#[derive(Debug, Clone, Default)]
pub struct AttemptLog {
    timestamps: VecDeque<u64>,
}

/// Whether `timestamp` still counts at `now` for a window of `window_ms`.
///
/// A timestamp ahead of `now` (the clock stepped back) stays active.
#[inline]
pub(crate) fn is_active(timestamp: u64, now: u64, window_ms: u64) -> bool {
    now.saturating_sub(timestamp) < window_ms
}

impl AttemptLog {
    /// Create an empty log sized for `max_attempts` entries.
    pub fn with_capacity(max_attempts: u32) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_attempts.min(64) as usize),
        }
    }

    /// Drop every timestamp that has left the window.
    ///
    /// Returns the number of timestamps removed.
    pub fn prune(&mut self, now: u64, window_ms: u64) -> usize {
        let before = self.timestamps.len();
        self.timestamps.retain(|&t| is_active(t, now, window_ms));
        before - self.timestamps.len()
    }

    /// Iterate over the timestamps still inside the window, oldest first.
    pub fn active(&self, now: u64, window_ms: u64) -> impl Iterator<Item = u64> + '_ {
        self.timestamps
            .iter()
            .copied()
            .filter(move |&t| is_active(t, now, window_ms))
    }

    /// Number of timestamps inside the window.
    pub fn active_count(&self, now: u64, window_ms: u64) -> usize {
        self.active(now, window_ms).count()
    }

    /// The oldest timestamp inside the window.
    pub fn oldest_active(&self, now: u64, window_ms: u64) -> Option<u64> {
        self.active(now, window_ms).min()
    }

    /// Record an attempt.
    pub fn push(&mut self, timestamp: u64) {
        self.timestamps.push_back(timestamp);
    }

    /// Number of stored timestamps, expired or not.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether no timestamps are stored.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_of(timestamps: &[u64]) -> AttemptLog {
        let mut log = AttemptLog::with_capacity(8);
        for &t in timestamps {
            log.push(t);
        }
        log
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        assert!(is_active(0, 999, 1_000));
        assert!(!is_active(0, 1_000, 1_000));
        // Clock stepped backwards
        assert!(is_active(5_000, 1_000, 1_000));
    }

    #[test]
    fn test_prune_removes_only_expired() {
        let mut log = log_of(&[0, 100, 500, 900]);

        let removed = log.prune(1_100, 1_000);

        assert_eq!(removed, 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.active(1_100, 1_000).collect::<Vec<_>>(), vec![500, 900]);
    }

    #[test]
    fn test_active_does_not_mutate() {
        let log = log_of(&[0, 100, 500]);

        assert_eq!(log.active_count(1_050, 1_000), 2);
        assert_eq!(log.len(), 3);
        assert_eq!(log.oldest_active(1_050, 1_000), Some(100));
    }

    #[test]
    fn test_prune_after_clock_step_back() {
        let mut log = log_of(&[5_000, 1_000]);

        let removed = log.prune(2_500, 1_000);

        assert_eq!(removed, 1);
        assert_eq!(log.active(2_500, 1_000).collect::<Vec<_>>(), vec![5_000]);
    }

    #[test]
    fn test_prune_to_empty() {
        let mut log = log_of(&[0, 10]);

        log.prune(5_000, 1_000);

        assert!(log.is_empty());
        assert_eq!(log.oldest_active(5_000, 1_000), None);
    }
}
