//! Utility functions for the allocation service

use crate::types::MatchId;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use uuid::Uuid;

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds elapsed between `start` and `now`, negative if `start` is in the future
pub fn elapsed_millis(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_milliseconds()
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        current_timestamp()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(current_timestamp())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Produces identifiers for matches created without one
pub trait MatchIdGenerator: Send + Sync {
    fn generate(&self) -> MatchId;
}

/// Time-ordered UUIDv7 identifiers: millisecond timestamp prefix plus random bits
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidMatchIdGenerator;

impl MatchIdGenerator for UuidMatchIdGenerator {
    fn generate(&self) -> MatchId {
        Uuid::now_v7().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let generator = UuidMatchIdGenerator;
        let id1 = generator.generate();
        let id2 = generator.generate();
        assert_ne!(id1, id2);
        assert!(Uuid::parse_str(&id1).is_ok());
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = current_timestamp();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(5));
        assert_eq!(elapsed_millis(start, clock.now()), 5 * 60 * 1000);

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_elapsed_millis_sign() {
        let start = current_timestamp();
        assert_eq!(elapsed_millis(start, start + Duration::seconds(2)), 2000);
        assert_eq!(elapsed_millis(start + Duration::seconds(2), start), -2000);
    }
}
