//! Background sweep task that reclaims memory for idle keys.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::limiter::RateLimiter;

/// Handle to a running sweep task.
#[derive(Debug)]
pub(crate) struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Spawn a sweep on the current Tokio runtime.
    ///
    /// The task only holds a weak reference, so it exits on its own once the
    /// limiter is dropped.
    pub(crate) fn spawn(limiter: Weak<RateLimiter>, period: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(limiter) = limiter.upgrade() else {
                            debug!("Rate limiter dropped, ending sweep");
                            break;
                        };
                        limiter.sweep();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Sweep shutdown requested");
                            break;
                        }
                    }
                }
            }
        });

        Self { shutdown, task }
    }

    /// A handle for observing whether the task has finished.
    pub(crate) fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    /// Signal the task to stop and wait for it to finish.
    pub(crate) async fn shutdown(self) {
        // The task may already be gone; nothing to signal then.
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweep task ended abnormally");
        }
    }
}
