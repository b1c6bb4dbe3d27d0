//! Health reporting

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Stored records beyond `max_events` tolerated before warning
pub const CAPACITY_SLACK: usize = 5_000;

/// Age beyond `max_age` tolerated before warning
pub const AGE_SLACK: Duration = Duration::from_secs(60 * 60);

/// Lifecycle state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoreStatus {
    /// Accepting events
    Open,
    /// Shut down; never reopens
    Closed,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreStatus::Open => f.write_str("OPEN"),
            StoreStatus::Closed => f.write_str("CLOSED"),
        }
    }
}

/// Non-fatal condition reported by [`EventLogStore::health_check`](crate::EventLogStore::health_check)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthWarning {
    /// The store is not accepting events
    NotOpen {
        /// Current status
        status: StoreStatus,
    },
    /// Retention is falling behind on count
    OverCapacity {
        /// Records stored
        stored: usize,
        /// Configured `max_events`
        max_events: usize,
    },
    /// Retention is falling behind on age
    StaleRecords {
        /// Timestamp of the oldest record
        oldest: DateTime<Utc>,
        /// Configured `max_age` in seconds
        max_age_secs: u64,
    },
}

impl fmt::Display for HealthWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthWarning::NotOpen { status } => write!(f, "event store status is {}", status),
            HealthWarning::OverCapacity { stored, max_events } => write!(
                f,
                "event store holds {} records, more than {} over max_events {}",
                stored, CAPACITY_SLACK, max_events
            ),
            HealthWarning::StaleRecords { oldest, max_age_secs } => write!(
                f,
                "oldest event ({}) is more than one hour past max_age of {}s",
                oldest.to_rfc3339(),
                max_age_secs
            ),
        }
    }
}

/// Inputs to a health evaluation
#[derive(Debug, Clone, Copy)]
pub(crate) struct HealthProbe {
    pub(crate) status: StoreStatus,
    pub(crate) stored: usize,
    pub(crate) max_events: usize,
    pub(crate) tail: Option<DateTime<Utc>>,
    pub(crate) max_age: Duration,
    pub(crate) now: DateTime<Utc>,
}

impl HealthProbe {
    pub(crate) fn evaluate(&self) -> Vec<HealthWarning> {
        let mut warnings = Vec::new();
        if self.status != StoreStatus::Open {
            warnings.push(HealthWarning::NotOpen {
                status: self.status,
            });
        }
        if self.stored > self.max_events.saturating_add(CAPACITY_SLACK) {
            warnings.push(HealthWarning::OverCapacity {
                stored: self.stored,
                max_events: self.max_events,
            });
        }
        if let Some(oldest) = self.tail {
            let age = (self.now - oldest).to_std().unwrap_or(Duration::ZERO);
            if age > self.max_age + AGE_SLACK {
                warnings.push(HealthWarning::StaleRecords {
                    oldest,
                    max_age_secs: self.max_age.as_secs(),
                });
            }
        }
        warnings
    }
}
