//! Immutable log records and their persisted encoding
//!
//! A [`LogRecord`] is built once, at commit time, and never changes. The
//! encoded form is a self-describing JSON object: unknown fields are ignored
//! and missing optional fields take their defaults, so records written by
//! older or newer builds still decode. Records lacking a timestamp or level
//! are rejected.
//!
//! Records are ordered by `(timestamp, session_id, request_id, level)` with
//! empty (absent) session and request ids sorting last; remaining fields only
//! break ties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::context::SessionContext;
use crate::error::{Error, Result};
use crate::format::RecordFormat;
use crate::level::LogLevel;
use crate::limits::{truncate_chars, truncate_message, MAX_THROWABLE_DEPTH, MAX_TOPIC_CHARS};
use crate::throwable::ThrowableInfo;

/// Version marker of the record encoding.
///
/// Stored once per queue. A queue carrying a different marker is cleared at
/// open instead of being decoded.
pub const RECORD_FORMAT_VERSION: &str = "1";

/// One committed log event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    topic: String,
    message: String,
    throwable: Option<ThrowableInfo>,
    context: SessionContext,
}

impl LogRecord {
    /// Start building a record
    pub fn builder() -> LogRecordBuilder {
        LogRecordBuilder::default()
    }

    /// Build a record from its required fields plus topic and message
    pub fn new(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        topic: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let topic = topic.into();
        let message = message.into();
        Self {
            timestamp,
            level,
            topic: truncate_chars(&topic, MAX_TOPIC_CHARS),
            message: truncate_message(&message),
            throwable: None,
            context: SessionContext::default(),
        }
    }

    /// When the event happened
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

    /// Message body
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Attached error chain, if any
    pub fn throwable(&self) -> Option<&ThrowableInfo> {
        self.throwable.as_ref()
    }

    /// Session context
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Username from the session context (empty for system events)
    pub fn username(&self) -> &str {
        &self.context.username
    }

    /// Encode to the persisted string form
    pub fn encode(&self) -> Result<String> {
        let stored = StoredRecord {
            timestamp: Some(self.timestamp),
            level: Some(self.level),
            topic: self.topic.clone(),
            message: self.message.clone(),
            throwable: self
                .throwable
                .as_ref()
                .and_then(|t| t.capped(MAX_THROWABLE_DEPTH)),
            context: self.context.clone(),
        };
        Ok(serde_json::to_string(&stored)?)
    }

    /// Decode a persisted string
    ///
    /// Fails with [`Error::Serialization`] for malformed input and
    /// [`Error::Corruption`] when timestamp or level is missing.
    pub fn decode(encoded: &str) -> Result<Self> {
        let stored: StoredRecord = serde_json::from_str(encoded)?;
        let timestamp = stored
            .timestamp
            .ok_or_else(|| Error::corruption("stored record has no timestamp"))?;
        let level = stored
            .level
            .ok_or_else(|| Error::corruption("stored record has no level"))?;
        let mut builder = LogRecord::builder()
            .timestamp(timestamp)
            .level(level)
            .topic(stored.topic)
            .message(stored.message)
            .context(stored.context);
        if let Some(throwable) = stored.throwable {
            builder = builder.throwable(throwable);
        }
        builder.build()
    }

    /// Render with the given output format
    pub fn render(&self, format: RecordFormat) -> String {
        format.render(self)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&RecordFormat::Plain.render(self))
    }
}

/// Empty strings stand in for absent values and sort after present ones.
fn cmp_absent_last(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

impl Ord for LogRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| cmp_absent_last(&self.context.session_id, &other.context.session_id))
            .then_with(|| cmp_absent_last(&self.context.request_id, &other.context.request_id))
            .then_with(|| self.level.cmp(&other.level))
            .then_with(|| self.topic.cmp(&other.topic))
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| self.context.cmp_remaining(&other.context))
            .then_with(|| self.throwable.cmp(&other.throwable))
    }
}

impl PartialOrd for LogRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl SessionContext {
    fn cmp_remaining(&self, other: &Self) -> Ordering {
        self.username
            .cmp(&other.username)
            .then_with(|| self.domain.cmp(&other.domain))
            .then_with(|| self.source_address.cmp(&other.source_address))
    }
}

/// Builder for [`LogRecord`]; timestamp and level are mandatory.
#[derive(Debug, Default)]
pub struct LogRecordBuilder {
    timestamp: Option<DateTime<Utc>>,
    level: Option<LogLevel>,
    topic: String,
    message: String,
    throwable: Option<ThrowableInfo>,
    context: SessionContext,
}

impl LogRecordBuilder {
    /// Set the timestamp
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the level
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Set the topic
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the message body
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attach an error chain
    pub fn throwable(mut self, throwable: ThrowableInfo) -> Self {
        self.throwable = Some(throwable);
        self
    }

    /// Set the session context
    pub fn context(mut self, context: SessionContext) -> Self {
        self.context = context;
        self
    }

    /// Build the record, applying size limits
    pub fn build(self) -> Result<LogRecord> {
        let timestamp = self
            .timestamp
            .ok_or_else(|| Error::InvalidRecord("timestamp is required".to_string()))?;
        let level = self
            .level
            .ok_or_else(|| Error::InvalidRecord("level is required".to_string()))?;
        Ok(LogRecord {
            timestamp,
            level,
            topic: truncate_chars(&self.topic, MAX_TOPIC_CHARS),
            message: truncate_message(&self.message),
            throwable: self
                .throwable
                .and_then(|t| t.capped(MAX_THROWABLE_DEPTH)),
            context: self.context.truncated(),
        })
    }
}

/// Persisted shape of a record
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    level: Option<LogLevel>,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    throwable: Option<ThrowableInfo>,
    #[serde(flatten)]
    context: SessionContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{MAX_MESSAGE_CHARS, TRUNCATION_MARKER};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sample() -> LogRecord {
        LogRecord::builder()
            .timestamp(ts(0))
            .level(LogLevel::Warn)
            .topic("auth.ldap")
            .message("bind failed")
            .throwable(
                ThrowableInfo::new("connection refused")
                    .with_stack(vec!["connect".into(), "bind".into()])
                    .with_cause(ThrowableInfo::new("timeout"))
                    .with_suppressed(ThrowableInfo::new("close failed")),
            )
            .context(
                SessionContext::empty()
                    .with_session_id("s-1")
                    .with_request_id("r-9")
                    .with_username("alice")
                    .with_domain("corp")
                    .with_source_address("10.0.0.7"),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_timestamp_and_level() {
        let missing_ts = LogRecord::builder().level(LogLevel::Info).build();
        assert!(matches!(missing_ts, Err(Error::InvalidRecord(_))));
        let missing_level = LogRecord::builder().timestamp(ts(0)).build();
        assert!(matches!(missing_level, Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_encode_decode_preserves_all_fields() {
        let record = sample();
        let decoded = LogRecord::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.throwable().unwrap().suppressed.len(), 1);
    }

    #[test]
    fn test_decode_ignores_unknown_and_defaults_missing_fields() {
        let encoded = r#"{"timestamp":"2024-01-02T03:04:05Z","level":"ERROR","extra":42}"#;
        let record = LogRecord::decode(encoded).unwrap();
        assert_eq!(record.level(), LogLevel::Error);
        assert_eq!(record.topic(), "");
        assert_eq!(record.context(), &SessionContext::default());
        assert!(record.throwable().is_none());
    }

    #[test]
    fn test_decode_rejects_missing_level() {
        let encoded = r#"{"timestamp":"2024-01-02T03:04:05Z","message":"hi"}"#;
        assert!(matches!(LogRecord::decode(encoded), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_decode_garbage_is_an_error() {
        assert!(LogRecord::decode("\u{0}\u{1}garbage").is_err());
        assert!(LogRecord::decode("").is_err());
        assert!(LogRecord::decode("[1,2,3]").is_err());
    }

    #[test]
    fn test_long_message_truncated_with_marker() {
        let record = LogRecord::new(ts(0), LogLevel::Info, "t", "m".repeat(MAX_MESSAGE_CHARS * 2));
        assert!(record.message().ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_ordering_by_timestamp_first() {
        let early = LogRecord::new(ts(0), LogLevel::Fatal, "a", "x");
        let late = LogRecord::new(ts(1), LogLevel::Trace, "a", "x");
        assert!(early < late);
    }

    #[test]
    fn test_ordering_absent_session_sorts_last() {
        let with_session = LogRecord::builder()
            .timestamp(ts(0))
            .level(LogLevel::Info)
            .context(SessionContext::empty().with_session_id("zzz"))
            .build()
            .unwrap();
        let without_session = LogRecord::new(ts(0), LogLevel::Info, "", "");
        assert!(with_session < without_session);
    }

    #[test]
    fn test_ordering_level_breaks_ties() {
        let info = LogRecord::new(ts(0), LogLevel::Info, "a", "x");
        let error = LogRecord::new(ts(0), LogLevel::Error, "a", "x");
        assert!(info < error);
        assert_eq!(info.cmp(&info.clone()), Ordering::Equal);
    }

    fn arb_record() -> impl proptest::strategy::Strategy<Value = LogRecord> {
        use proptest::prelude::*;
        (0i64..4, 0usize..7, "(|s1|s2)", "(|r1|r2)", "[a-c]{0,2}").prop_map(
            |(secs, level, session, request, message)| {
                LogRecord::builder()
                    .timestamp(ts(secs))
                    .level(LogLevel::ALL[level])
                    .message(message)
                    .context(
                        SessionContext::empty()
                            .with_session_id(session)
                            .with_request_id(request),
                    )
                    .build()
                    .unwrap()
            },
        )
    }

    proptest::proptest! {
        #[test]
        fn prop_ordering_is_consistent_with_equality(a in arb_record(), b in arb_record()) {
            proptest::prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
            proptest::prop_assert_eq!(a.cmp(&b) == Ordering::Equal, a == b);
        }
    }
}
