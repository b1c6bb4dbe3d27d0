//! Shared helpers for engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eventstore_core::{Error, LogLevel, PendingMessage, Result, SessionContext};
use eventstore_engine::StoreSettings;
use eventstore_storage::{MemoryQueue, PersistentQueue, RecordIter};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Settings whose workers stay idle unless a test drives them
pub fn quiet_settings() -> StoreSettings {
    StoreSettings {
        max_events: 10_000,
        max_age: Some(Duration::from_secs(3600)),
        max_buffer_size: 1_000,
        max_buffer_wait_time: Duration::from_millis(200),
        max_trim_size: 500,
        flush_delay: Duration::from_secs(3600),
        cleanup_interval: Some(Duration::from_secs(3600)),
    }
}

/// Info-level event with an explicit timestamp
pub fn event_at(timestamp: DateTime<Utc>, message: &str) -> PendingMessage {
    PendingMessage::new(LogLevel::Info, "test")
        .with_timestamp(timestamp)
        .with_message(message)
}

/// Event by `username`
pub fn user_event(level: LogLevel, username: &str, message: &str) -> PendingMessage {
    PendingMessage::new(level, "auth")
        .with_context(SessionContext::empty().with_username(username))
        .with_message(message)
}

/// `count` timestamps one second apart, ending `end_ago` before now
pub fn timestamps(count: usize, end_ago: ChronoDuration) -> Vec<DateTime<Utc>> {
    let end = Utc::now() - end_ago;
    (0..count)
        .map(|i| end - ChronoDuration::seconds((count - 1 - i) as i64))
        .collect()
}

/// Queue whose appends can be made to fail
#[derive(Default)]
pub struct FailingQueue {
    pub inner: MemoryQueue,
    pub fail_appends: AtomicBool,
}

impl PersistentQueue for FailingQueue {
    fn append_all(&self, records: &[String]) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::queue("injected append failure"));
        }
        self.inner.append_all(records)
    }

    fn remove_from_tail(&self, count: usize) -> Result<usize> {
        self.inner.remove_from_tail(count)
    }

    fn peek_tail(&self) -> Result<Option<String>> {
        self.inner.peek_tail()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn iter_head_to_tail(&self) -> RecordIter {
        self.inner.iter_head_to_tail()
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn format_version(&self) -> Result<Option<String>> {
        self.inner.format_version()
    }

    fn set_format_version(&self, version: &str) -> Result<()> {
        self.inner.set_format_version(version)
    }
}

/// Queue whose appends block until the gate is opened
#[derive(Default)]
pub struct GatedQueue {
    pub inner: MemoryQueue,
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedQueue {
    pub fn open_gate(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl PersistentQueue for GatedQueue {
    fn append_all(&self, records: &[String]) -> Result<()> {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        drop(open);
        self.inner.append_all(records)
    }

    fn remove_from_tail(&self, count: usize) -> Result<usize> {
        self.inner.remove_from_tail(count)
    }

    fn peek_tail(&self) -> Result<Option<String>> {
        self.inner.peek_tail()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn iter_head_to_tail(&self) -> RecordIter {
        self.inner.iter_head_to_tail()
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn format_version(&self) -> Result<Option<String>> {
        self.inner.format_version()
    }

    fn set_format_version(&self, version: &str) -> Result<()> {
        self.inner.set_format_version(version)
    }
}

/// Queue whose iteration costs `delay` per record
pub struct SlowQueue {
    pub inner: MemoryQueue,
    pub delay: Duration,
}

impl PersistentQueue for SlowQueue {
    fn append_all(&self, records: &[String]) -> Result<()> {
        self.inner.append_all(records)
    }

    fn remove_from_tail(&self, count: usize) -> Result<usize> {
        self.inner.remove_from_tail(count)
    }

    fn peek_tail(&self) -> Result<Option<String>> {
        self.inner.peek_tail()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn iter_head_to_tail(&self) -> RecordIter {
        let delay = self.delay;
        Box::new(self.inner.iter_head_to_tail().inspect(move |_| std::thread::sleep(delay)))
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }

    fn format_version(&self) -> Result<Option<String>> {
        self.inner.format_version()
    }

    fn set_format_version(&self, version: &str) -> Result<()> {
        self.inner.set_format_version(version)
    }
}
