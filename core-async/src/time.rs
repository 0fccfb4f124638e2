//! Time utilities.
//!
//! [`Instant`] is tokio's instant so that tests running with a paused clock
//! (`#[tokio::test(start_paused = true)]`) observe the same time as timers.

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};
pub use tokio::time::{
    error::Elapsed, interval, interval_at, sleep, sleep_until, timeout, Instant, Interval,
    MissedTickBehavior, Sleep, Timeout,
};

/// Milliseconds since the Unix epoch, or 0 if the system clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Saturating millisecond count of a duration.
pub fn as_millis_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
