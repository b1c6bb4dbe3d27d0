//! Event store engine
//!
//! This crate orchestrates the lower layers:
//! - EventLogStore: intake buffer, writer and cleaner workers, lifecycle
//! - StoreSettings / StoreConfig: validated limits and the `eventstore.toml` form
//! - RetentionPolicy: count and age trimming rules
//! - SearchCursor: filtered, time-boxed scans newest to oldest
//! - StoreLayer: forwards `tracing` events into a store
//!
//! The engine is the only component that knows about:
//! - Record encoding at the queue boundary
//! - Scheduling of flush and cleanup work
//! - Health and statistics reporting

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod health;
pub mod intake;
pub mod layer;
pub mod retention;
pub mod search;
pub mod settings;
pub mod stats;
pub mod store;

pub use config::{StoreConfig, CONFIG_FILE_NAME};
pub use health::{HealthWarning, StoreStatus};
pub use intake::IntakeBuffer;
pub use layer::StoreLayer;
pub use retention::{RetentionPolicy, RETENTION_FLOOR};
pub use search::{EventTypeFilter, SearchCursor, SearchQuery, SearchResults, UsernameMatcher};
pub use settings::StoreSettings;
pub use stats::StoreStats;
pub use store::{EventLogStore, QUEUE_DIR_NAME, SHUTDOWN_FLUSH_TIMEOUT};
