//! Volatile queue implementation
//!
//! `MemoryQueue` keeps everything in process memory. It satisfies the full
//! [`PersistentQueue`] contract except durability, which makes it the queue
//! of choice for tests and for deployments that only need in-process history.

use eventstore_core::Result;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::queue::{PersistentQueue, RecordIter, SequenceIter, SequencedRecords};

/// In-memory persistent queue
#[derive(Debug, Default, Clone)]
pub struct MemoryQueue {
    records: Arc<RwLock<SequencedRecords>>,
}

impl MemoryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, tail (oldest) first
    pub fn snapshot_tail_to_head(&self) -> Vec<String> {
        self.records.read().iter_tail_to_head().cloned().collect()
    }
}

impl PersistentQueue for MemoryQueue {
    fn append_all(&self, records: &[String]) -> Result<()> {
        if !records.is_empty() {
            self.records.write().push_all(records);
        }
        Ok(())
    }

    fn remove_from_tail(&self, count: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        Ok(self.records.write().remove_tail(count))
    }

    fn peek_tail(&self) -> Result<Option<String>> {
        Ok(self.records.read().peek_tail())
    }

    fn size(&self) -> usize {
        self.records.read().len()
    }

    fn iter_head_to_tail(&self) -> RecordIter {
        Box::new(SequenceIter::new(Arc::clone(&self.records)))
    }

    fn clear(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }

    fn format_version(&self) -> Result<Option<String>> {
        Ok(self.records.read().format_version())
    }

    fn set_format_version(&self, version: &str) -> Result<()> {
        self.records.write().set_format_version(version);
        Ok(())
    }
}
