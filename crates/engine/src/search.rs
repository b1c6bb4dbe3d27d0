//! Filtered, time-boxed search over stored events
//!
//! A [`SearchCursor`] walks the queue newest to oldest and yields the records
//! matching every active filter. It stops early once `max_results` records
//! have been returned or `max_duration` has elapsed; a cut-off result is the
//! normal outcome of a bounded search, not an error.
//!
//! The deadline is checked before every candidate, so a search overruns its
//! budget by at most one record's decode and match time.

use eventstore_core::{LogLevel, LogRecord};
use eventstore_storage::RecordIter;
use regex::{Regex, RegexBuilder};
use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::store::StoreInner;

/// Username patterns shorter than this are always matched literally
const MIN_PATTERN_CHARS: usize = 3;

/// Which events a search considers, by presence of a username
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventTypeFilter {
    /// Events without a username
    System,
    /// Events with a username
    User,
    /// No filtering
    #[default]
    Both,
}

impl EventTypeFilter {
    fn matches(&self, record: &LogRecord) -> bool {
        match self {
            EventTypeFilter::System => record.username().is_empty(),
            EventTypeFilter::User => !record.username().is_empty(),
            EventTypeFilter::Both => true,
        }
    }
}

/// Search predicate and limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Lowest level returned
    pub minimum_level: LogLevel,
    /// Username pattern (regex when it compiles, otherwise literal)
    pub username: Option<String>,
    /// Case-insensitive substring of the message or topic
    pub text: Option<String>,
    /// System, user or both
    pub event_type: EventTypeFilter,
    /// Most records returned
    pub max_results: usize,
    /// Wall-clock budget
    pub max_duration: Duration,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            minimum_level: LogLevel::Trace,
            username: None,
            text: None,
            event_type: EventTypeFilter::Both,
            max_results: 1_000,
            max_duration: Duration::from_secs(30),
        }
    }
}

impl SearchQuery {
    /// Query with default limits and no filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Only return records at or above `level`
    pub fn with_minimum_level(mut self, level: LogLevel) -> Self {
        self.minimum_level = level;
        self
    }

    /// Filter by username pattern
    pub fn with_username(mut self, pattern: impl Into<String>) -> Self {
        self.username = Some(pattern.into());
        self
    }

    /// Filter by free text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Filter by event type
    pub fn with_event_type(mut self, event_type: EventTypeFilter) -> Self {
        self.event_type = event_type;
        self
    }

    /// Cap the number of results
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Cap the search time
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

/// Compiled username filter.
///
/// Patterns of at least three characters that compile are matched as a
/// case-insensitive regex anchored at both ends. Everything else is a
/// case-insensitive exact match.
#[derive(Debug, Clone)]
pub enum UsernameMatcher {
    /// Lowercased literal
    Exact(String),
    /// Anchored, case-insensitive pattern
    Pattern(Regex),
}

impl UsernameMatcher {
    /// Compile a username filter
    pub fn new(pattern: &str) -> Self {
        if pattern.chars().count() < MIN_PATTERN_CHARS {
            return UsernameMatcher::Exact(pattern.to_lowercase());
        }
        match RegexBuilder::new(&format!("^(?:{})$", pattern))
            .case_insensitive(true)
            .build()
        {
            Ok(regex) => UsernameMatcher::Pattern(regex),
            Err(_) => UsernameMatcher::Exact(pattern.to_lowercase()),
        }
    }

    /// Test a username
    pub fn matches(&self, username: &str) -> bool {
        match self {
            UsernameMatcher::Exact(expected) => username.to_lowercase() == *expected,
            UsernameMatcher::Pattern(regex) => regex.is_match(username),
        }
    }
}

/// Compiled form of a [`SearchQuery`] predicate
#[derive(Debug, Clone)]
struct RecordFilter {
    minimum_level: LogLevel,
    username: Option<UsernameMatcher>,
    text: Option<String>,
    event_type: EventTypeFilter,
}

impl RecordFilter {
    fn new(query: &SearchQuery) -> Self {
        Self {
            minimum_level: query.minimum_level,
            username: query
                .username
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(UsernameMatcher::new),
            text: query
                .text
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase),
            event_type: query.event_type,
        }
    }

    fn matches(&self, record: &LogRecord) -> bool {
        if !record.level().is_at_least(self.minimum_level) {
            return false;
        }
        if !self.event_type.matches(record) {
            return false;
        }
        if let Some(matcher) = &self.username {
            if !matcher.matches(record.username()) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            if !record.message().to_lowercase().contains(text)
                && !record.topic().to_lowercase().contains(text)
            {
                return false;
            }
        }
        true
    }
}

/// Collected output of a finished search
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Matching records, newest first
    pub records: Vec<LogRecord>,
    /// Time spent searching
    pub elapsed: Duration,
    /// True when a result or time limit stopped the scan before the oldest record
    pub truncated: bool,
}

/// Lazy search over the store, newest to oldest
pub struct SearchCursor {
    store: Arc<StoreInner>,
    records: RecordIter,
    filter: RecordFilter,
    max_results: usize,
    max_duration: Duration,
    started: Instant,
    returned: usize,
    scanned: usize,
    finished: Option<Duration>,
    truncated: bool,
}

impl SearchCursor {
    pub(crate) fn new(store: Arc<StoreInner>, records: RecordIter, query: &SearchQuery) -> Self {
        Self {
            store,
            records,
            filter: RecordFilter::new(query),
            max_results: query.max_results,
            max_duration: query.max_duration,
            started: Instant::now(),
            returned: 0,
            scanned: 0,
            finished: None,
            truncated: false,
        }
    }

    /// Records returned so far
    pub fn results_returned(&self) -> usize {
        self.returned
    }

    /// Search time; frozen once the cursor is exhausted or cut off
    pub fn elapsed(&self) -> Duration {
        self.finished.unwrap_or_else(|| self.started.elapsed())
    }

    /// True when a limit ended the scan
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Drain the cursor into a [`SearchResults`]
    pub fn into_results(mut self) -> SearchResults {
        let records: Vec<LogRecord> = self.by_ref().collect();
        SearchResults {
            records,
            elapsed: self.elapsed(),
            truncated: self.truncated,
        }
    }

    fn finish(&mut self, truncated: bool) {
        let elapsed = self.started.elapsed();
        self.finished = Some(elapsed);
        self.truncated = truncated;
        debug!(
            target: "eventstore::search",
            returned = self.returned,
            scanned = self.scanned,
            elapsed_ms = elapsed.as_millis() as u64,
            truncated,
            "Search finished"
        );
    }
}

impl Iterator for SearchCursor {
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        if self.finished.is_some() {
            return None;
        }
        if self.returned >= self.max_results {
            self.finish(true);
            return None;
        }
        loop {
            if self.started.elapsed() > self.max_duration {
                self.finish(true);
                return None;
            }
            let raw = match self.records.next() {
                Some(raw) => raw,
                None => {
                    self.finish(false);
                    return None;
                }
            };
            self.scanned += 1;
            let record = match self.store.decode(&raw) {
                Some(record) => record,
                None => continue,
            };
            if self.filter.matches(&record) {
                self.returned += 1;
                return Some(record);
            }
        }
    }
}

impl FusedIterator for SearchCursor {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eventstore_core::SessionContext;

    fn record(level: LogLevel, topic: &str, message: &str, username: &str) -> LogRecord {
        LogRecord::builder()
            .timestamp(Utc::now())
            .level(level)
            .topic(topic)
            .message(message)
            .context(SessionContext::empty().with_username(username))
            .build()
            .unwrap()
    }

    #[test]
    fn test_username_regex_is_anchored() {
        let matcher = UsernameMatcher::new("^admin.*");
        assert!(matches!(matcher, UsernameMatcher::Pattern(_)));
        assert!(matcher.matches("administrator"));
        assert!(matcher.matches("ADMIN"));
        assert!(!matcher.matches("sysadmin"));
    }

    #[test]
    fn test_short_username_is_literal() {
        let matcher = UsernameMatcher::new("ab");
        assert!(matches!(matcher, UsernameMatcher::Exact(_)));
        assert!(matcher.matches("AB"));
        assert!(!matcher.matches("abc"));
        assert!(!matcher.matches("xab"));
    }

    #[test]
    fn test_invalid_regex_is_literal() {
        let matcher = UsernameMatcher::new("bob[");
        assert!(matches!(matcher, UsernameMatcher::Exact(_)));
        assert!(matcher.matches("BOB["));
        assert!(!matcher.matches("bob"));
    }

    #[test]
    fn test_plain_username_matches_whole_name_only() {
        let matcher = UsernameMatcher::new("alice");
        assert!(matcher.matches("Alice"));
        assert!(!matcher.matches("alice2"));
    }

    #[test]
    fn test_filter_level_and_event_type() {
        let filter = RecordFilter::new(
            &SearchQuery::new()
                .with_minimum_level(LogLevel::Warn)
                .with_event_type(EventTypeFilter::User),
        );
        assert!(filter.matches(&record(LogLevel::Error, "auth", "denied", "bob")));
        assert!(!filter.matches(&record(LogLevel::Info, "auth", "ok", "bob")));
        assert!(!filter.matches(&record(LogLevel::Error, "cron", "failed", "")));

        let system = RecordFilter::new(&SearchQuery::new().with_event_type(EventTypeFilter::System));
        assert!(system.matches(&record(LogLevel::Info, "cron", "tick", "")));
        assert!(!system.matches(&record(LogLevel::Info, "auth", "login", "bob")));
    }

    #[test]
    fn test_filter_text_matches_message_or_topic() {
        let filter = RecordFilter::new(&SearchQuery::new().with_text("PASSWORD"));
        assert!(filter.matches(&record(LogLevel::Info, "auth", "password changed", "")));
        assert!(filter.matches(&record(LogLevel::Info, "password-policy", "updated", "")));
        assert!(!filter.matches(&record(LogLevel::Info, "auth", "login", "")));
    }

    #[test]
    fn test_empty_filters_are_ignored() {
        let filter = RecordFilter::new(&SearchQuery::new().with_username("").with_text(""));
        assert!(filter.matches(&record(LogLevel::Trace, "t", "m", "anyone")));
    }
}
