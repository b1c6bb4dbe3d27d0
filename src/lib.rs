//! eventstore - durable, bounded event log for embedding in applications
//!
//! Producers hand events to an [`EventLogStore`]; a writer thread commits them
//! in batches to a persistent queue, a cleaner thread enforces count and age
//! retention, and [`EventLogStore::search`] runs filtered, time-boxed scans
//! newest to oldest.
//!
//! # Quick Start
//!
//! ```ignore
//! use eventstore::{EventLogStore, LogLevel, PendingMessage, SearchQuery, SessionContext};
//!
//! let store = EventLogStore::open_path("/var/lib/myapp/events")?;
//!
//! store.write(
//!     PendingMessage::new(LogLevel::Warn, "auth")
//!         .with_context(SessionContext::empty().with_username("alice"))
//!         .with_message("login failed"),
//! );
//!
//! for record in store.search(&SearchQuery::new().with_username("alice")) {
//!     println!("{}", record);
//! }
//! store.shutdown();
//! ```
//!
//! # Architecture
//!
//! - `eventstore-core`: records, levels, session context, encoding
//! - `eventstore-storage`: the persistent queue contract and its implementations
//! - `eventstore-engine`: the store, its workers, search and configuration

pub use eventstore_core::{
    Error, LogLevel, LogRecord, LogRecordBuilder, ParseLevelError, PendingMessage, RecordFormat,
    Result, SessionContext, ThrowableInfo, RECORD_FORMAT_VERSION, UNAVAILABLE_MESSAGE,
};
pub use eventstore_engine::{
    EventLogStore, EventTypeFilter, HealthWarning, RetentionPolicy, SearchCursor, SearchQuery,
    SearchResults, StoreConfig, StoreLayer, StoreSettings, StoreStats, StoreStatus,
    UsernameMatcher, CONFIG_FILE_NAME,
};
pub use eventstore_storage::{FileQueue, FileQueueConfig, MemoryQueue, PersistentQueue};
