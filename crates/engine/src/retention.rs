//! Retention policy
//!
//! Decides how many of the oldest records the cleaner removes next. The
//! decision is a pure function of the stored count, the oldest record's
//! timestamp and the clock, so it is evaluated afresh before every batch.
//!
//! # Rules
//!
//! 1. Never trim at or below [`RETENTION_FLOOR`] records
//! 2. Over capacity: remove the excess, capped at `max_trim_size`
//! 3. Oldest record missing or unreadable: remove it
//! 4. Oldest record past `max_age`: remove `max_trim_size` when the backlog is
//!    large (`n / max_trim_size > 100`), otherwise one record at a time
//! 5. Otherwise nothing

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::settings::StoreSettings;

/// Stored count at or below which nothing is ever trimmed
pub const RETENTION_FLOOR: usize = 100;

/// Count and age limits applied by the cleaner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum stored records
    pub max_events: usize,
    /// Maximum record age
    pub max_age: Duration,
    /// Per-batch eviction cap
    pub max_trim_size: usize,
}

impl RetentionPolicy {
    /// Build from checked settings
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            max_events: settings.max_events.max(0) as usize,
            max_age: settings.effective_max_age(),
            max_trim_size: settings.max_trim_size.max(1),
        }
    }

    /// Number of tail records to remove now.
    ///
    /// `tail` is the oldest record's timestamp, or `None` when that record is
    /// missing or cannot be decoded.
    pub fn removal_count(
        &self,
        stored: usize,
        tail: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> usize {
        if stored <= RETENTION_FLOOR {
            return 0;
        }
        if stored > self.max_events {
            return self.max_trim_size.min(stored - self.max_events);
        }
        let tail = match tail {
            Some(tail) => tail,
            None => return 1,
        };
        let age = (now - tail).to_std().unwrap_or(Duration::ZERO);
        if age > self.max_age {
            if stored / self.max_trim_size > 100 {
                self.max_trim_size
            } else {
                1
            }
        } else {
            0
        }
    }

    /// True when the next append must first evict an equal number of records
    pub fn must_evict_before_write(&self, stored: usize) -> bool {
        stored >= self.max_events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    fn policy(max_events: usize) -> RetentionPolicy {
        RetentionPolicy {
            max_events,
            max_age: Duration::from_secs(3600),
            max_trim_size: 500,
        }
    }

    #[test]
    fn test_floor_wins_over_everything() {
        let now = Utc::now();
        let ancient = now - ChronoDuration::days(365);
        assert_eq!(policy(100).removal_count(100, Some(ancient), now), 0);
        assert_eq!(policy(100).removal_count(100, None, now), 0);
    }

    #[test]
    fn test_over_capacity_removes_excess_capped() {
        let now = Utc::now();
        assert_eq!(policy(100).removal_count(150, Some(now), now), 50);
        assert_eq!(policy(100).removal_count(5_000, Some(now), now), 500);
    }

    #[test]
    fn test_unreadable_tail_removes_one() {
        let now = Utc::now();
        assert_eq!(policy(1_000).removal_count(500, None, now), 1);
    }

    #[test]
    fn test_expired_tail_erodes_slowly_then_in_bulk() {
        let now = Utc::now();
        let old = now - ChronoDuration::hours(2);
        let large = policy(1_000_000);
        assert_eq!(large.removal_count(500, Some(old), now), 1);
        assert_eq!(large.removal_count(50_500, Some(old), now), 500);
        assert_eq!(large.removal_count(50_500, Some(now), now), 0);
    }

    #[test]
    fn test_must_evict_before_write() {
        assert!(policy(100).must_evict_before_write(100));
        assert!(!policy(100).must_evict_before_write(99));
    }

    proptest! {
        #[test]
        fn prop_never_trims_below_floor(
            stored in 0usize..20_000,
            max_events in 100usize..10_000,
            trim in 1usize..2_000,
            age_secs in 0i64..100_000,
            readable in any::<bool>(),
        ) {
            let now = Utc::now();
            let policy = RetentionPolicy {
                max_events,
                max_age: Duration::from_secs(3600),
                max_trim_size: trim,
            };
            let tail = readable.then(|| now - ChronoDuration::seconds(age_secs));
            let removed = policy.removal_count(stored, tail, now);
            prop_assert!(removed <= trim);
            if removed > 0 {
                prop_assert!(stored - removed >= RETENTION_FLOOR);
            }
            if stored > max_events {
                prop_assert!(stored - removed >= max_events);
            }
        }
    }
}
