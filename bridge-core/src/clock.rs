//! Clock abstraction for condition transition times and record timestamps.
//!
//! Production code uses [`SystemClock`]; tests inject a [`MockClock`] whose
//! time only moves when told to, which makes transition-time and deadline
//! assertions deterministic.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Provider trait for wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for testing with controllable time.
///
/// Starts at a fixed instant and only advances via [`MockClock::advance`].
#[derive(Debug)]
pub struct MockClock {
    current: Mutex<DateTime<Utc>>,
}

impl MockClock {
    /// Create a mock clock fixed at 2024-01-15T10:30:00Z.
    pub fn new() -> Self {
        Self::at(DateTime::<Utc>::from_timestamp(1_705_314_600, 0).unwrap_or_default())
    }

    /// Create a mock clock fixed at the given instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(instant),
        }
    }

    /// Create a mock clock fixed at the specified RFC 3339 time.
    ///
    /// # Panics
    ///
    /// Panics if `iso_time` is not valid RFC 3339.
    pub fn fixed(iso_time: &str) -> Self {
        let instant = DateTime::parse_from_rfc3339(iso_time)
            .expect("Invalid RFC 3339 datetime format")
            .with_timezone(&Utc);
        Self::at(instant)
    }

    /// Advance time by the specified duration.
    ///
    /// # Panics
    ///
    /// Panics if `duration` does not fit a [`TimeDelta`].
    pub fn advance(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).expect("Duration out of range");
        let mut current = self.current.lock();
        *current += delta;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}
