//! Pre-commit log messages
//!
//! A [`PendingMessage`] is what producers hand to the store. It lives in the
//! intake buffer until the writer converts it into exactly one
//! [`LogRecord`]. The message body may be deferred: the supplier runs at most
//! once, the first time the body is needed, and the result is memoized. A
//! supplier that panics yields [`UNAVAILABLE_MESSAGE`] instead of unwinding
//! into the thread that commits the event.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::context::SessionContext;
use crate::error::Result;
use crate::level::LogLevel;
use crate::record::LogRecord;
use crate::throwable::ThrowableInfo;

/// Body stored when a deferred supplier panics
pub const UNAVAILABLE_MESSAGE: &str = "<message unavailable>";

type BodySupplier = Box<dyn FnOnce() -> String + Send>;

/// Lazily evaluated message body
struct MessageBody {
    value: OnceCell<String>,
    supplier: Mutex<Option<BodySupplier>>,
    supplier_panicked: AtomicBool,
}

impl MessageBody {
    fn ready(value: String) -> Self {
        Self {
            value: OnceCell::with_value(value),
            supplier: Mutex::new(None),
            supplier_panicked: AtomicBool::new(false),
        }
    }

    fn deferred(supplier: BodySupplier) -> Self {
        Self {
            value: OnceCell::new(),
            supplier: Mutex::new(Some(supplier)),
            supplier_panicked: AtomicBool::new(false),
        }
    }

    fn get(&self) -> &str {
        self.value.get_or_init(|| {
            let supplier = self.supplier.lock().take();
            match supplier.map(|supplier| catch_unwind(AssertUnwindSafe(supplier))) {
                Some(Ok(body)) => body,
                Some(Err(_)) => {
                    self.supplier_panicked.store(true, Ordering::Relaxed);
                    UNAVAILABLE_MESSAGE.to_string()
                }
                None => String::new(),
            }
        })
    }

    fn is_unavailable(&self) -> bool {
        self.get();
        self.supplier_panicked.load(Ordering::Relaxed)
    }
}

/// A log event awaiting commit
pub struct PendingMessage {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    topic: String,
    context: SessionContext,
    body: MessageBody,
    duration: Option<Duration>,
    throwable: Option<ThrowableInfo>,
    thread: String,
}

impl PendingMessage {
    /// Create a message stamped with the current time and thread
    pub fn new(level: LogLevel, topic: impl Into<String>) -> Self {
        let current = std::thread::current();
        let thread = match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        };
        Self {
            timestamp: Utc::now(),
            level,
            topic: topic.into(),
            context: SessionContext::default(),
            body: MessageBody::ready(String::new()),
            duration: None,
            throwable: None,
            thread,
        }
    }

    /// Builder: override the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder: attach session context
    pub fn with_context(mut self, context: SessionContext) -> Self {
        self.context = context;
        self
    }

    /// Builder: set an already-formatted message body
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.body = MessageBody::ready(message.into());
        self
    }

    /// Builder: defer formatting of the message body until commit
    pub fn with_message_fn<F>(mut self, supplier: F) -> Self
    where
        F: FnOnce() -> String + Send + 'static,
    {
        self.body = MessageBody::deferred(Box::new(supplier));
        self
    }

    /// Builder: record how long the logged operation took
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Builder: attach an error chain
    pub fn with_throwable(mut self, throwable: ThrowableInfo) -> Self {
        self.throwable = Some(throwable);
        self
    }

    /// Builder: capture a Rust error and its sources
    pub fn with_error(self, err: &(dyn std::error::Error + 'static)) -> Self {
        self.with_throwable(ThrowableInfo::from_error(err))
    }

    /// Event time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Severity
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Source identifier
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Session context
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Operation duration, if recorded
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Name (or id) of the producing thread
    pub fn thread(&self) -> &str {
        &self.thread
    }

    /// Message body; evaluates a deferred supplier on first call
    pub fn message(&self) -> &str {
        self.body.get()
    }

    /// True when the deferred supplier panicked and the body was replaced by
    /// [`UNAVAILABLE_MESSAGE`]. Evaluates the supplier if needed.
    pub fn message_unavailable(&self) -> bool {
        self.body.is_unavailable()
    }

    /// Convert into the committed record
    ///
    /// A recorded duration is appended to the body as ` (<n> ms)`.
    pub fn into_record(self) -> Result<LogRecord> {
        let mut message = self.body.get().to_string();
        if let Some(duration) = self.duration {
            message.push_str(&format!(" ({} ms)", duration.as_millis()));
        }
        let mut builder = LogRecord::builder()
            .timestamp(self.timestamp)
            .level(self.level)
            .topic(self.topic)
            .message(message)
            .context(self.context);
        if let Some(throwable) = self.throwable {
            builder = builder.throwable(throwable);
        }
        builder.build()
    }
}

impl fmt::Debug for PendingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingMessage")
            .field("timestamp", &self.timestamp)
            .field("level", &self.level)
            .field("topic", &self.topic)
            .field("thread", &self.thread)
            .field("evaluated", &self.body.value.get().is_some())
            .finish()
    }
}
