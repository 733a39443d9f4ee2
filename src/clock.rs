//! Wall-clock access.
//!
//! Dedup decisions, breaker cooldowns and event timestamps all read time
//! through [`Clock`] so they can be driven deterministically in tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Starts at the given unix timestamp (seconds).
    pub fn at_timestamp(secs: i64) -> Self {
        Self::new(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    pub fn set_timestamp(&self, secs: i64) {
        if let Some(t) = Utc.timestamp_opt(secs, 0).single() {
            *self.lock() = t;
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::at_timestamp(1000);
        assert_eq!(clock.now().timestamp(), 1000);
        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now().timestamp(), 1005);
        clock.set_timestamp(1610);
        assert_eq!(clock.now().timestamp(), 1610);
    }
}
