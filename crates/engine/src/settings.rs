//! Validated store settings
//!
//! `StoreSettings` is the programmatic form of the store configuration.
//! Out-of-range values are floored rather than rejected; the one exception is
//! `max_events <= 0`, which is preserved as the "store disabled" sentinel.

use std::time::Duration;

/// Smallest accepted positive `max_events`
pub const MIN_MAX_EVENTS: i64 = 100;

/// Smallest accepted `max_age`
pub const MIN_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Lower bound of the derived cleanup interval
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound of the derived cleanup interval
pub const MAX_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of cleanup runs per `max_age` window
const CLEANUP_SLICES: u32 = 60;

/// Smallest intake capacity that still yields non-empty flush batches
const MIN_BUFFER_SIZE: usize = 2;

/// Store capacity, age and buffering limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Maximum number of stored records; `0` disables the store
    pub max_events: i64,
    /// Maximum age of stored records
    pub max_age: Option<Duration>,
    /// Intake buffer capacity
    pub max_buffer_size: usize,
    /// Longest a producer may wait for intake space before the event is dropped
    pub max_buffer_wait_time: Duration,
    /// Most records evicted per cleanup batch
    pub max_trim_size: usize,
    /// Delay before a deferred flush runs
    pub flush_delay: Duration,
    /// Explicit cleanup interval; derived from `max_age` when unset
    pub cleanup_interval: Option<Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_events: 1_000_000,
            max_age: Some(Duration::from_secs(30 * 24 * 60 * 60)),
            max_buffer_size: 10_000,
            max_buffer_wait_time: Duration::from_secs(1),
            max_trim_size: 500,
            flush_delay: Duration::from_secs(5),
            cleanup_interval: None,
        }
    }
}

impl StoreSettings {
    /// Raise out-of-range values to their floors. Idempotent.
    pub fn apply_value_checks(&mut self) {
        if self.max_events <= 0 {
            self.max_events = 0;
        } else if self.max_events < MIN_MAX_EVENTS {
            self.max_events = MIN_MAX_EVENTS;
        }

        self.max_age = Some(match self.max_age {
            Some(age) if age >= MIN_MAX_AGE => age,
            _ => MIN_MAX_AGE,
        });

        self.max_buffer_size = self.max_buffer_size.max(MIN_BUFFER_SIZE);
        self.max_trim_size = self.max_trim_size.max(1);
        if let Some(interval) = self.cleanup_interval {
            if interval.is_zero() {
                self.cleanup_interval = None;
            }
        }
    }

    /// Consume and return a checked copy
    pub fn checked(mut self) -> Self {
        self.apply_value_checks();
        self
    }

    /// True when `max_events` is the disabled sentinel
    pub fn is_disabled(&self) -> bool {
        self.max_events <= 0
    }

    /// `max_age`, floored
    pub fn effective_max_age(&self) -> Duration {
        match self.max_age {
            Some(age) if age >= MIN_MAX_AGE => age,
            _ => MIN_MAX_AGE,
        }
    }

    /// Records per flush pass
    pub fn batch_size(&self) -> usize {
        self.max_buffer_size.max(MIN_BUFFER_SIZE) - 1
    }

    /// How often the cleaner wakes up.
    ///
    /// Uses the explicit override when set, otherwise `max_age / 60`, clamped
    /// to between one minute and one day.
    pub fn cleanup_interval(&self) -> Duration {
        if let Some(interval) = self.cleanup_interval.filter(|d| !d.is_zero()) {
            return interval;
        }
        (self.effective_max_age() / CLEANUP_SLICES).clamp(MIN_CLEANUP_INTERVAL, MAX_CLEANUP_INTERVAL)
    }
}
