//! Wall-clock sources.

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Raw system time. Can jump when the host clock is adjusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock read once, then advanced by tokio's monotonic clock.
///
/// Never goes backwards within a process. Under a paused tokio runtime it
/// follows the test's virtual time, which keeps timer tests deterministic.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin_wall: DateTime<Utc>,
    origin: Instant,
}

impl MonotonicClock {
    /// Anchor at the current system time.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchor at a fixed wall-clock time.
    #[must_use]
    pub fn starting_at(origin_wall: DateTime<Utc>) -> Self {
        Self {
            origin_wall,
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::MAX);
        self.origin_wall
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Delay from `now` until `execution_time`, clamped to zero for past times.
#[must_use]
pub fn delay_until(now: DateTime<Utc>, execution_time: DateTime<Utc>) -> std::time::Duration {
    execution_time
        .signed_duration_since(now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}
