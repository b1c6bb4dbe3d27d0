//! Persistent queue contract
//!
//! The event store keeps its history in an ordered sequence of opaque encoded
//! records: batches are appended at the **head** (newest end) and evicted from
//! the **tail** (oldest end). Iteration runs head to tail, newest first.
//!
//! Implementations must tolerate one appender and one remover working
//! concurrently with any number of readers. Iterators are lazy: they never
//! hold a lock between elements, so a long search does not stall writes.

use eventstore_core::Result;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Lazy head-to-tail iterator over encoded records
pub type RecordIter = Box<dyn Iterator<Item = String> + Send>;

/// Durable double-ended sequence of encoded records
pub trait PersistentQueue: Send + Sync {
    /// Append a batch at the head. The last element becomes the newest.
    fn append_all(&self, records: &[String]) -> Result<()>;

    /// Remove up to `count` records from the tail; returns how many were removed.
    fn remove_from_tail(&self, count: usize) -> Result<usize>;

    /// Oldest record, if any
    fn peek_tail(&self) -> Result<Option<String>>;

    /// Number of stored records
    fn size(&self) -> usize;

    /// True when nothing is stored
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Iterate from head (newest) to tail (oldest).
    ///
    /// The iterator starts at the head as of this call. Records appended
    /// afterwards are not visited; iteration ends early if the cursor falls
    /// behind the tail because of eviction.
    fn iter_head_to_tail(&self) -> RecordIter;

    /// Remove every record
    fn clear(&self) -> Result<()>;

    /// Encoding version marker stored with the queue
    fn format_version(&self) -> Result<Option<String>>;

    /// Replace the encoding version marker
    fn set_format_version(&self, version: &str) -> Result<()>;
}

/// In-memory image of a queue, addressed by monotonically increasing sequence
/// numbers. The front of `records` is the tail.
#[derive(Debug, Default)]
pub(crate) struct SequencedRecords {
    records: VecDeque<String>,
    tail_seq: u64,
    format_version: Option<String>,
}

impl SequencedRecords {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn push_all(&mut self, batch: &[String]) {
        self.records.extend(batch.iter().cloned());
    }

    pub(crate) fn push_owned(&mut self, batch: Vec<String>) {
        self.records.extend(batch);
    }

    pub(crate) fn remove_tail(&mut self, count: usize) -> usize {
        let removed = count.min(self.records.len());
        self.records.drain(..removed);
        self.tail_seq += removed as u64;
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.tail_seq += self.records.len() as u64;
        self.records.clear();
    }

    pub(crate) fn peek_tail(&self) -> Option<String> {
        self.records.front().cloned()
    }

    pub(crate) fn head_seq(&self) -> Option<u64> {
        if self.records.is_empty() {
            None
        } else {
            Some(self.tail_seq + self.records.len() as u64 - 1)
        }
    }

    pub(crate) fn get(&self, seq: u64) -> Option<&String> {
        if seq < self.tail_seq {
            return None;
        }
        self.records.get((seq - self.tail_seq) as usize)
    }

    pub(crate) fn iter_tail_to_head(&self) -> impl Iterator<Item = &String> {
        self.records.iter()
    }

    pub(crate) fn format_version(&self) -> Option<String> {
        self.format_version.clone()
    }

    pub(crate) fn set_format_version(&mut self, version: &str) {
        self.format_version = Some(version.to_string());
    }
}

/// Iterator that walks sequence numbers downwards, taking the read lock once
/// per element.
pub(crate) struct SequenceIter {
    source: Arc<RwLock<SequencedRecords>>,
    next: Option<u64>,
}

impl SequenceIter {
    pub(crate) fn new(source: Arc<RwLock<SequencedRecords>>) -> Self {
        let next = source.read().head_seq();
        Self { source, next }
    }
}

impl Iterator for SequenceIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let seq = self.next?;
        let record = self.source.read().get(seq).cloned();
        match record {
            Some(record) => {
                self.next = seq.checked_sub(1);
                Some(record)
            }
            None => {
                // Evicted underneath us
                self.next = None;
                None
            }
        }
    }
}
