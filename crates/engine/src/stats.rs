//! Store counters and moving averages

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Weight of the newest sample in the moving averages
const EWMA_ALPHA: f64 = 0.2;

/// Exponentially weighted moving average
#[derive(Debug)]
pub(crate) struct MovingAverage {
    alpha: f64,
    value: Mutex<Option<f64>>,
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self {
            alpha: EWMA_ALPHA,
            value: Mutex::new(None),
        }
    }
}

impl MovingAverage {
    pub(crate) fn add(&self, sample: f64) {
        let mut value = self.value.lock();
        *value = Some(match *value {
            Some(current) => current + self.alpha * (sample - current),
            None => sample,
        });
    }

    pub(crate) fn get(&self) -> f64 {
        self.value.lock().unwrap_or(0.0)
    }
}

/// Live counters owned by the store
#[derive(Debug, Default)]
pub(crate) struct StoreCounters {
    pub(crate) records_written: AtomicU64,
    pub(crate) records_evicted: AtomicU64,
    pub(crate) records_dropped: AtomicU64,
    pub(crate) failed_batches: AtomicU64,
    pub(crate) flush_cycles: AtomicU64,
    pub(crate) cleanup_cycles: AtomicU64,
    flush_latency_ms: MovingAverage,
    flush_batch_size: MovingAverage,
}

impl StoreCounters {
    pub(crate) fn record_flush(&self, batch: usize, evicted: usize, elapsed: Duration) {
        self.records_written.fetch_add(batch as u64, Ordering::Relaxed);
        self.records_evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        self.flush_latency_ms.add(elapsed.as_secs_f64() * 1000.0);
        self.flush_batch_size.add(batch as f64);
    }

    pub(crate) fn snapshot(&self, stored_count: usize, buffered: usize) -> StoreStats {
        StoreStats {
            records_written: self.records_written.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            flush_cycles: self.flush_cycles.load(Ordering::Relaxed),
            cleanup_cycles: self.cleanup_cycles.load(Ordering::Relaxed),
            avg_flush_latency_ms: self.flush_latency_ms.get(),
            avg_flush_batch_size: self.flush_batch_size.get(),
            stored_count,
            buffered,
        }
    }
}

/// Store metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    /// Records appended to the queue since open.
    pub records_written: u64,
    /// Records removed from the queue since open, by the writer or the cleaner.
    pub records_evicted: u64,
    /// Events discarded because the intake buffer stayed full or encoding failed.
    pub records_dropped: u64,
    /// Batches lost to queue failures.
    pub failed_batches: u64,
    /// Completed writer cycles.
    pub flush_cycles: u64,
    /// Completed cleanup cycles.
    pub cleanup_cycles: u64,
    /// Moving average of batch persistence time.
    pub avg_flush_latency_ms: f64,
    /// Moving average of records per batch.
    pub avg_flush_batch_size: f64,
    /// Records currently stored.
    pub stored_count: usize,
    /// Events waiting in the intake buffer.
    pub buffered: usize,
}
