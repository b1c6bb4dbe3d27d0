//! Event log store
//!
//! `EventLogStore` accepts events from any number of producer threads and
//! persists them through two dedicated workers:
//!
//! - **writer** (`eventstore-writer`): drains the intake buffer in batches and
//!   appends them to the queue. It runs on demand: immediately when the buffer
//!   is more than half full, otherwise `flush_delay` after the first buffered
//!   event.
//! - **cleaner** (`eventstore-cleaner`): wakes every cleanup interval and
//!   trims the oldest records according to the [`RetentionPolicy`].
//!
//! Producers only ever touch the intake buffer. Queue mutations from the two
//! workers are serialized by a lock that is never held while encoding or
//! decoding.
//!
//! # Lifecycle
//!
//! ```text
//! open() ──► OPEN ──shutdown()──► CLOSED
//! ```
//!
//! `shutdown()` stops the cleaner immediately, gives the writer a bounded
//! grace period to drain the buffer, then marks the store closed. Dropping
//! the store shuts it down.

use chrono::{DateTime, Utc};
use eventstore_core::{
    Error, LogLevel, LogRecord, PendingMessage, RecordFormat, Result, SessionContext,
    ThrowableInfo, RECORD_FORMAT_VERSION,
};
use eventstore_storage::{FileQueue, PersistentQueue};
use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{StoreConfig, CONFIG_FILE_NAME};
use crate::health::{HealthProbe, HealthWarning, StoreStatus};
use crate::intake::IntakeBuffer;
use crate::retention::RetentionPolicy;
use crate::search::{SearchCursor, SearchQuery};
use crate::settings::StoreSettings;
use crate::stats::{StoreCounters, StoreStats};

/// Directory holding the queue journal inside a store directory
pub const QUEUE_DIR_NAME: &str = "queue";

/// Grace period for the final flush during shutdown
pub const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounds on the cleaner's pause between removal batches
const MIN_TRIM_PAUSE: Duration = Duration::from_millis(20);
const MAX_TRIM_PAUSE: Duration = Duration::from_millis(2000);

#[derive(Debug, Default)]
struct WriterState {
    /// When the next flush should start; `Some` means a flush is scheduled
    due: Option<Instant>,
    running: bool,
    shutdown: bool,
    exited: bool,
    completed_cycles: u64,
}

/// State shared between the store handle and its workers
pub(crate) struct StoreInner {
    settings: StoreSettings,
    policy: RetentionPolicy,
    minimum_level: LogLevel,
    queue: Arc<dyn PersistentQueue>,
    intake: IntakeBuffer,
    closing: AtomicBool,
    closed: AtomicBool,
    evict_before_write: AtomicBool,
    decode_failure_logged: AtomicBool,
    /// Serializes queue mutation between writer and cleaner
    queue_lock: Mutex<()>,
    /// One cleanup cycle at a time
    cleanup_lock: Mutex<()>,
    writer: Mutex<WriterState>,
    writer_cond: Condvar,
    cleaner_stop: Mutex<bool>,
    cleaner_cond: Condvar,
    counters: StoreCounters,
}

/// Durable, bounded event log
pub struct EventLogStore {
    inner: Arc<StoreInner>,
    record_format: RecordFormat,
    /// Held for the whole of `shutdown` so concurrent callers return closed
    shutdown_lock: Mutex<()>,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    cleaner_handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventLogStore {
    /// Open a store over `queue`.
    ///
    /// Settings are floored first. With `max_events == 0` the queue is
    /// cleared and [`Error::Disabled`] is returned. A queue written with a
    /// different record encoding is cleared before use.
    pub fn open(
        settings: StoreSettings,
        queue: Arc<dyn PersistentQueue>,
        minimum_level: LogLevel,
    ) -> Result<Self> {
        let settings = settings.checked();
        if settings.is_disabled() {
            let discarded = queue.size();
            queue.clear()?;
            info!(
                target: "eventstore::store",
                discarded,
                "Event store disabled (max_events = 0); stored events cleared"
            );
            return Err(Error::Disabled);
        }

        check_format_version(queue.as_ref())?;

        let inner = Arc::new(StoreInner {
            policy: RetentionPolicy::from_settings(&settings),
            intake: IntakeBuffer::new(settings.max_buffer_size),
            settings,
            minimum_level,
            queue,
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            evict_before_write: AtomicBool::new(false),
            decode_failure_logged: AtomicBool::new(false),
            queue_lock: Mutex::new(()),
            cleanup_lock: Mutex::new(()),
            writer: Mutex::new(WriterState::default()),
            writer_cond: Condvar::new(),
            cleaner_stop: Mutex::new(false),
            cleaner_cond: Condvar::new(),
            counters: StoreCounters::default(),
        });
        inner.refresh_evict_flag();

        let store = Self {
            inner,
            record_format: RecordFormat::default(),
            shutdown_lock: Mutex::new(()),
            writer_handle: Mutex::new(None),
            cleaner_handle: Mutex::new(None),
        };

        let writer_inner = Arc::clone(&store.inner);
        let writer = std::thread::Builder::new()
            .name("eventstore-writer".to_string())
            .spawn(move || writer_loop(writer_inner))
            .map_err(|e| Error::internal(format!("failed to spawn writer thread: {}", e)))?;
        *store.writer_handle.lock() = Some(writer);

        let cleaner_inner = Arc::clone(&store.inner);
        let cleaner = std::thread::Builder::new()
            .name("eventstore-cleaner".to_string())
            .spawn(move || cleaner_loop(cleaner_inner))
            .map_err(|e| Error::internal(format!("failed to spawn cleaner thread: {}", e)))?;
        *store.cleaner_handle.lock() = Some(cleaner);

        let settings = &store.inner.settings;
        info!(
            target: "eventstore::store",
            stored = store.inner.queue.size(),
            max_events = settings.max_events,
            max_age_secs = settings.effective_max_age().as_secs(),
            cleanup_interval_secs = settings.cleanup_interval().as_secs(),
            minimum_level = %minimum_level,
            "Event store opened"
        );
        Ok(store)
    }

    /// Open the on-disk store in `dir`, creating a default `eventstore.toml`
    /// on first use.
    pub fn open_path(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&config_path)?;
        let config = StoreConfig::from_file(&config_path)?;
        Self::open_with_config(dir, &config)
    }

    /// Open the on-disk store in `dir` with an explicit config.
    pub fn open_with_config(dir: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let minimum_level = config.minimum_level()?;
        let record_format = config.record_format()?;
        let queue = FileQueue::open(dir.as_ref().join(QUEUE_DIR_NAME), config.queue.clone())?;
        Ok(Self::open(config.to_settings(), Arc::new(queue), minimum_level)?
            .with_record_format(record_format))
    }

    /// Builder: choose how [`render`](Self::render) formats records
    pub fn with_record_format(mut self, format: RecordFormat) -> Self {
        self.record_format = format;
        self
    }

    /// Output format chosen at configuration time
    pub fn record_format(&self) -> RecordFormat {
        self.record_format
    }

    /// Render a record in the configured output format
    pub fn render(&self, record: &LogRecord) -> String {
        self.record_format.render(record)
    }

    /// Submit an event. Never fails and never blocks longer than
    /// `max_buffer_wait_time`; the event is silently discarded when the store
    /// is not open or the level is below the minimum.
    pub fn write(&self, message: PendingMessage) {
        let inner = &self.inner;
        if !inner.accepts(message.level()) {
            return;
        }
        inner.schedule_flush();
        if let Err(message) = inner
            .intake
            .offer(message, inner.settings.max_buffer_wait_time)
        {
            inner
                .counters
                .records_dropped
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                target: "eventstore::store",
                topic = message.topic(),
                level = %message.level(),
                capacity = inner.intake.capacity(),
                "Intake buffer full; event dropped"
            );
        }
    }

    /// Submit an event built from its parts. The message supplier only runs
    /// if the event is accepted.
    pub fn record<F>(
        &self,
        level: LogLevel,
        topic: impl Into<String>,
        context: SessionContext,
        message: F,
        throwable: Option<ThrowableInfo>,
        duration: Option<Duration>,
    ) where
        F: FnOnce() -> String + Send + 'static,
    {
        if !self.inner.accepts(level) {
            return;
        }
        let mut pending = PendingMessage::new(level, topic)
            .with_context(context)
            .with_message_fn(message);
        if let Some(throwable) = throwable {
            pending = pending.with_throwable(throwable);
        }
        if let Some(duration) = duration {
            pending = pending.with_duration(duration);
        }
        self.write(pending);
    }

    /// Search stored events, newest first
    pub fn search(&self, query: &SearchQuery) -> SearchCursor {
        SearchCursor::new(
            Arc::clone(&self.inner),
            self.inner.queue.iter_head_to_tail(),
            query,
        )
    }

    /// Report conditions an operator should look at
    pub fn health_check(&self) -> Vec<HealthWarning> {
        HealthProbe {
            status: self.status(),
            stored: self.inner.queue.size(),
            max_events: self.inner.policy.max_events,
            tail: self.inner.tail_timestamp(),
            max_age: self.inner.policy.max_age,
            now: Utc::now(),
        }
        .evaluate()
    }

    /// Timestamp of the oldest stored event
    pub fn tail_timestamp(&self) -> Option<DateTime<Utc>> {
        self.inner.tail_timestamp()
    }

    /// Number of stored events
    pub fn stored_count(&self) -> usize {
        self.inner.queue.size()
    }

    /// Lifecycle state
    pub fn status(&self) -> StoreStatus {
        self.inner.status()
    }

    /// Checked settings in effect
    pub fn settings(&self) -> &StoreSettings {
        &self.inner.settings
    }

    /// Events below this level are discarded
    pub fn minimum_level(&self) -> LogLevel {
        self.inner.minimum_level
    }

    /// Counters and moving averages
    pub fn stats(&self) -> StoreStats {
        self.inner
            .counters
            .snapshot(self.inner.queue.size(), self.inner.intake.len())
    }

    /// Ask the writer to flush now and wait for a full writer cycle.
    ///
    /// Returns `false` if the cycle did not complete within `timeout`.
    pub fn flush(&self, timeout: Duration) -> bool {
        let inner = &self.inner;
        let deadline = Instant::now() + timeout;
        let mut state = inner.writer.lock();
        if state.exited {
            return inner.intake.is_empty();
        }
        let target = state.completed_cycles + if state.running { 2 } else { 1 };
        state.due = Some(Instant::now());
        inner.writer_cond.notify_all();
        while state.completed_cycles < target {
            if state.exited {
                return inner.intake.is_empty();
            }
            if inner.writer_cond.wait_until(&mut state, deadline).timed_out() {
                return state.completed_cycles >= target;
            }
        }
        true
    }

    /// Run one cleanup cycle on the calling thread; returns the number of
    /// records removed.
    pub fn run_cleanup(&self) -> usize {
        self.inner.cleanup_cycle()
    }

    /// Stop the workers, flush what is buffered and close the store.
    /// Idempotent; every caller returns only once the store is closed.
    pub fn shutdown(&self) {
        let _shutdown = self.shutdown_lock.lock();
        let inner = &self.inner;
        if inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let started = Instant::now();
        let written_before = inner.counters.records_written.load(Ordering::SeqCst);
        let buffered = inner.intake.len();

        {
            let mut stop = inner.cleaner_stop.lock();
            *stop = true;
            inner.cleaner_cond.notify_all();
        }
        if let Some(handle) = self.cleaner_handle.lock().take() {
            let _ = handle.join();
        }

        match self.writer_handle.lock().take() {
            Some(handle) => {
                let deadline = Instant::now() + SHUTDOWN_FLUSH_TIMEOUT;
                let mut state = inner.writer.lock();
                state.shutdown = true;
                inner.writer_cond.notify_all();
                while !state.exited {
                    if inner.writer_cond.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                let exited = state.exited;
                drop(state);
                if exited {
                    let _ = handle.join();
                } else {
                    warn!(
                        target: "eventstore::store",
                        timeout_secs = SHUTDOWN_FLUSH_TIMEOUT.as_secs(),
                        "Writer did not finish the final flush in time"
                    );
                }
            }
            None => {
                inner.flush_cycle();
            }
        }

        inner.closed.store(true, Ordering::SeqCst);
        let flushed = inner.counters.records_written.load(Ordering::SeqCst) - written_before;
        info!(
            target: "eventstore::store",
            buffered,
            flushed,
            abandoned = inner.intake.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Event store closed"
        );
    }
}

impl Drop for EventLogStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bring the queue's encoding marker in line with the current record format,
/// clearing data that cannot be decoded.
fn check_format_version(queue: &dyn PersistentQueue) -> Result<()> {
    match queue.format_version()? {
        Some(version) if version == RECORD_FORMAT_VERSION => return Ok(()),
        Some(version) => {
            warn!(
                target: "eventstore::store",
                stored_version = %version,
                current_version = RECORD_FORMAT_VERSION,
                discarded = queue.size(),
                "Stored events use a different encoding; clearing"
            );
            queue.clear()?;
        }
        None if !queue.is_empty() => {
            warn!(
                target: "eventstore::store",
                discarded = queue.size(),
                "Stored events carry no encoding marker; clearing"
            );
            queue.clear()?;
        }
        None => {}
    }
    queue.set_format_version(RECORD_FORMAT_VERSION)
}

impl StoreInner {
    fn status(&self) -> StoreStatus {
        if self.closed.load(Ordering::SeqCst) {
            StoreStatus::Closed
        } else {
            StoreStatus::Open
        }
    }

    fn accepts(&self, level: LogLevel) -> bool {
        !self.closing.load(Ordering::Acquire)
            && self.status() == StoreStatus::Open
            && self.settings.max_events > 0
            && level.is_at_least(self.minimum_level)
    }

    fn schedule_flush(&self) {
        let mut state = self.writer.lock();
        let now = Instant::now();
        if self.intake.is_over_half_full() {
            if state.due.map_or(true, |due| due > now) {
                state.due = Some(now);
                self.writer_cond.notify_all();
            }
        } else if state.due.is_none() {
            state.due = Some(now + self.settings.flush_delay);
            self.writer_cond.notify_all();
        }
    }

    /// Decode a stored record, logging only the first failure
    pub(crate) fn decode(&self, raw: &str) -> Option<LogRecord> {
        match LogRecord::decode(raw) {
            Ok(record) => Some(record),
            Err(e) => {
                if !self.decode_failure_logged.swap(true, Ordering::Relaxed) {
                    warn!(
                        target: "eventstore::store",
                        error = %e,
                        "Skipping undecodable stored event; later failures are not reported"
                    );
                }
                None
            }
        }
    }

    fn tail_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.queue.peek_tail() {
            Ok(Some(raw)) => self.decode(&raw).map(|record| record.timestamp()),
            Ok(None) => None,
            Err(e) => {
                warn!(target: "eventstore::store", error = %e, "Failed to read oldest event");
                None
            }
        }
    }

    fn refresh_evict_flag(&self) {
        let evict = self.policy.must_evict_before_write(self.queue.size());
        self.evict_before_write.store(evict, Ordering::SeqCst);
    }

    /// Drain the intake buffer into the queue; returns records persisted
    fn flush_cycle(&self) -> usize {
        let batch_size = self.settings.batch_size();
        let mut flushed = 0;
        while self.status() == StoreStatus::Open {
            let batch = self.intake.drain_up_to(batch_size);
            if batch.is_empty() {
                break;
            }
            flushed += self.write_batch(batch);
        }
        self.counters.flush_cycles.fetch_add(1, Ordering::Relaxed);
        flushed
    }

    fn write_batch(&self, batch: Vec<PendingMessage>) -> usize {
        let started = Instant::now();
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut encoded = Vec::with_capacity(batch.len());
        for message in batch {
            if message.message_unavailable() {
                warn!(
                    target: "eventstore::writer",
                    topic = message.topic(),
                    level = %message.level(),
                    "Message supplier panicked; storing placeholder body"
                );
            }
            let timestamp = message.timestamp();
            oldest = Some(oldest.map_or(timestamp, |t| t.min(timestamp)));
            match message.into_record().and_then(|record| record.encode()) {
                Ok(line) => encoded.push(line),
                Err(e) => {
                    self.counters.records_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "eventstore::writer", error = %e, "Dropping unencodable event");
                }
            }
        }
        if encoded.is_empty() {
            return 0;
        }

        let result = {
            let _queue = self.queue_lock.lock();
            let evicted = if self.evict_before_write.load(Ordering::SeqCst) {
                self.queue.remove_from_tail(encoded.len())
            } else {
                Ok(0)
            };
            evicted.and_then(|evicted| self.queue.append_all(&encoded).map(|_| evicted))
        };

        match result {
            Ok(evicted) => {
                let elapsed = started.elapsed();
                self.counters.record_flush(encoded.len(), evicted, elapsed);
                debug!(
                    target: "eventstore::writer",
                    batch = encoded.len(),
                    evicted,
                    oldest = ?oldest,
                    elapsed_us = elapsed.as_micros() as u64,
                    "Batch persisted"
                );
                encoded.len()
            }
            Err(e) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "eventstore::writer",
                    error = %e,
                    batch = encoded.len(),
                    "Failed to persist event batch"
                );
                0
            }
        }
    }

    fn cleaner_stopped(&self) -> bool {
        *self.cleaner_stop.lock()
    }

    /// Sleep up to `timeout`; true if the cleaner was told to stop
    fn wait_for_stop(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.cleaner_stop.lock();
        while !*stopped {
            if self.cleaner_cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    /// Trim until the retention policy is satisfied; returns records removed
    pub(crate) fn cleanup_cycle(&self) -> usize {
        let _cycle = self.cleanup_lock.lock();
        let started = Instant::now();
        let mut removed_total = 0;
        let mut last_cost: Option<Duration> = None;

        while self.status() == StoreStatus::Open && !self.cleaner_stopped() {
            let count = self.policy.removal_count(
                self.queue.size(),
                self.tail_timestamp(),
                Utc::now(),
            );
            if count == 0 {
                break;
            }
            if let Some(cost) = last_cost {
                if self.wait_for_stop(cost.clamp(MIN_TRIM_PAUSE, MAX_TRIM_PAUSE)) {
                    break;
                }
            }

            let batch_started = Instant::now();
            let removed = {
                let _queue = self.queue_lock.lock();
                self.queue.remove_from_tail(count)
            };
            match removed {
                Ok(0) => break,
                Ok(removed) => {
                    removed_total += removed;
                    self.counters
                        .records_evicted
                        .fetch_add(removed as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(target: "eventstore::cleaner", error = %e, "Failed to trim events");
                    break;
                }
            }
            last_cost = Some(batch_started.elapsed());
        }

        self.refresh_evict_flag();
        self.counters.cleanup_cycles.fetch_add(1, Ordering::Relaxed);
        if removed_total > 0 {
            debug!(
                target: "eventstore::cleaner",
                removed = removed_total,
                remaining = self.queue.size(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Cleanup cycle finished"
            );
        }
        removed_total
    }
}

/// Marks the writer as exited even if a cycle panics, so shutdown and
/// flush waiters are released.
struct WriterExitGuard<'a> {
    inner: &'a StoreInner,
}

impl Drop for WriterExitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.writer.lock();
        state.running = false;
        state.exited = true;
        self.inner.writer_cond.notify_all();
    }
}

fn writer_loop(inner: Arc<StoreInner>) {
    let _exit = WriterExitGuard { inner: &inner };
    loop {
        let final_cycle = {
            let mut state = inner.writer.lock();
            let final_cycle = loop {
                if state.shutdown {
                    break true;
                }
                match state.due {
                    Some(due) if Instant::now() >= due => break false,
                    Some(due) => {
                        inner.writer_cond.wait_until(&mut state, due);
                    }
                    None => inner.writer_cond.wait(&mut state),
                }
            };
            state.due = None;
            state.running = true;
            final_cycle
        };

        let flushed = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            inner.flush_cycle()
        })) {
            Ok(flushed) => flushed,
            Err(e) => {
                inner.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "eventstore::writer",
                    panic = e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)"),
                    "Writer cycle panicked; batch lost"
                );
                0
            }
        };

        let mut state = inner.writer.lock();
        state.running = false;
        state.completed_cycles += 1;
        if state.due.is_none() && !inner.intake.is_empty() {
            state.due = Some(Instant::now() + inner.settings.flush_delay);
        }
        inner.writer_cond.notify_all();
        if final_cycle {
            debug!(target: "eventstore::writer", flushed, "Final flush complete");
            return;
        }
    }
}

fn cleaner_loop(inner: Arc<StoreInner>) {
    let interval = inner.settings.cleanup_interval();
    while !inner.wait_for_stop(interval) {
        inner.cleanup_cycle();
    }
    debug!(target: "eventstore::cleaner", "Cleaner stopped");
}
