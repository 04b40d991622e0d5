//! Time provider port, so expiry and "today" are testable.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use std::sync::RwLock;

pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Midnight UTC of the current day.
    fn start_of_today(&self) -> DateTime<Utc> {
        let now = self.now();
        Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN))
    }
}

/// Wall clock (production).
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct FixedTimeProvider {
    now: RwLock<DateTime<Utc>>,
}

impl FixedTimeProvider {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}
