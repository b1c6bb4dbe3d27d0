//! Storage layer for the event store
//!
//! This crate defines the persistent queue the store commits into and ships
//! two implementations:
//! - MemoryQueue: volatile, for tests and in-process history
//! - FileQueue: durable journal file with CRC-framed operations, replay on
//!   open and compaction of evicted records
//!
//! Records are opaque strings here; encoding belongs to `eventstore-core`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;
pub mod journal;
pub mod memory;
pub mod queue;

pub use file::{FileQueue, FileQueueConfig, JOURNAL_FILE_NAME};
pub use memory::MemoryQueue;
pub use queue::{PersistentQueue, RecordIter};
