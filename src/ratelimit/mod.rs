//! Rate limiting logic and state management.

mod clock;
mod limiter;
mod sweeper;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::{EntryDetails, LimiterConfig, RateLimiter, DEFAULT_CLEANUP_INTERVAL_MS};
pub use window::AttemptLog;
