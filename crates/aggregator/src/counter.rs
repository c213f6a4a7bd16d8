//! Completed-crossings counter shared between the aggregator and readers.

use chrono::{Datelike, NaiveDate};
use common::validation::now_local;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use telemetry::metrics::AGGREGATOR_DAILY_COUNT;

/// Day key in the high half, count in the low half
fn pack(day: u32, count: u32) -> u64 {
    (u64::from(day) << 32) | u64::from(count)
}

fn unpack(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

fn day_key(day: NaiveDate) -> u32 {
    day.num_days_from_ce().max(1) as u32
}

/// Per-day count of completed records; clones share the same count
#[derive(Debug, Clone, Default)]
pub struct DailyCounter {
    /// Day key 0 before the first increment
    state: Arc<AtomicU64>,
}

impl DailyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) -> u64 {
        self.increment_on(now_local().date())
    }

    /// Count one record on `day`, starting from zero when the day changed
    pub fn increment_on(&self, day: NaiveDate) -> u64 {
        let key = day_key(day);
        let bump = |packed: u64| {
            let (current, count) = unpack(packed);
            if current == key {
                pack(key, count.saturating_add(1))
            } else {
                pack(key, 1)
            }
        };
        let previous = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |packed| Some(bump(packed)))
            .unwrap_or_else(|packed| packed);

        let value = u64::from(unpack(bump(previous)).1);
        AGGREGATOR_DAILY_COUNT.set(value as i64);
        value
    }

    pub fn get(&self) -> u64 {
        self.get_on(now_local().date())
    }

    /// Count for `day`; zero if nothing was counted that day
    pub fn get_on(&self, day: NaiveDate) -> u64 {
        let (current, count) = unpack(self.state.load(Ordering::SeqCst));
        if current == day_key(day) {
            u64::from(count)
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_counts_per_day() {
        let counter = DailyCounter::new();
        assert_eq!(counter.get_on(day(1)), 0);

        assert_eq!(counter.increment_on(day(1)), 1);
        assert_eq!(counter.increment_on(day(1)), 2);
        assert_eq!(counter.get_on(day(1)), 2);

        assert_eq!(counter.increment_on(day(2)), 1);
        assert_eq!(counter.get_on(day(1)), 0);
        assert_eq!(counter.get_on(day(2)), 1);
    }

    #[test]
    fn test_clones_share_the_count() {
        let counter = DailyCounter::new();
        let reader = counter.clone();
        counter.increment_on(day(3));
        counter.increment_on(day(3));
        assert_eq!(reader.get_on(day(3)), 2);
    }

    #[test]
    fn test_concurrent_rollover_keeps_every_increment() {
        let counter = DailyCounter::new();
        for _ in 0..5 {
            counter.increment_on(day(1));
        }

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let counter = counter.clone();
                scope.spawn(move || {
                    for _ in 0..250 {
                        counter.increment_on(day(2));
                    }
                });
            }
        });

        assert_eq!(counter.get_on(day(2)), 1000);
        assert_eq!(counter.get_on(day(1)), 0);
    }
}
