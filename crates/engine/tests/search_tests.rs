//! Integration tests for search
//!
//! Covers filter semantics, ordering, result and time limits, and tolerance
//! of undecodable records.

mod common;

use chrono::Duration as ChronoDuration;
use common::{event_at, quiet_settings, timestamps, user_event, SlowQueue};
use eventstore_core::{LogLevel, LogRecord, PendingMessage, RECORD_FORMAT_VERSION};
use eventstore_engine::{EventLogStore, EventTypeFilter, SearchQuery};
use eventstore_storage::{MemoryQueue, PersistentQueue};
use std::sync::Arc;
use std::time::Duration;

fn open(queue: MemoryQueue) -> EventLogStore {
    EventLogStore::open(quiet_settings(), Arc::new(queue), LogLevel::Trace).unwrap()
}

#[test]
fn test_username_regex_and_literal_fallback() {
    let store = open(MemoryQueue::new());
    for name in ["administrator", "sysadmin", "ab", "abc", "AB"] {
        store.write(user_event(LogLevel::Info, name, "login"));
    }
    assert!(store.flush(Duration::from_secs(5)));

    let regex_hits: Vec<String> = store
        .search(&SearchQuery::new().with_username("^admin.*"))
        .map(|r| r.username().to_string())
        .collect();
    assert_eq!(regex_hits, vec!["administrator"]);

    let mut literal_hits: Vec<String> = store
        .search(&SearchQuery::new().with_username("ab"))
        .map(|r| r.username().to_string())
        .collect();
    literal_hits.sort();
    assert_eq!(literal_hits, vec!["AB", "ab"]);
}

#[test]
fn test_results_are_newest_first_in_write_order() {
    let queue = MemoryQueue::new();
    let store = open(queue.clone());
    for (i, ts) in timestamps(60, ChronoDuration::zero()).into_iter().enumerate() {
        store.write(event_at(ts, &i.to_string()));
    }
    assert!(store.flush(Duration::from_secs(5)));

    let persisted: Vec<String> = queue
        .snapshot_tail_to_head()
        .iter()
        .map(|raw| LogRecord::decode(raw).unwrap().message().to_string())
        .collect();
    let expected: Vec<String> = (0..60).map(|i| i.to_string()).collect();
    assert_eq!(persisted, expected);

    let mut searched: Vec<String> = store
        .search(&SearchQuery::new())
        .map(|r| r.message().to_string())
        .collect();
    searched.reverse();
    assert_eq!(searched, expected);
}

#[test]
fn test_combined_filters() {
    let store = open(MemoryQueue::new());
    store.write(user_event(LogLevel::Warn, "erin", "Password expired"));
    store.write(user_event(LogLevel::Info, "erin", "password changed"));
    store.write(PendingMessage::new(LogLevel::Error, "password-sync").with_message("job failed"));
    store.write(user_event(LogLevel::Error, "frank", "login denied"));
    assert!(store.flush(Duration::from_secs(5)));

    let user_password_warnings: Vec<_> = store
        .search(
            &SearchQuery::new()
                .with_minimum_level(LogLevel::Warn)
                .with_text("password")
                .with_event_type(EventTypeFilter::User),
        )
        .collect();
    assert_eq!(user_password_warnings.len(), 1);
    assert_eq!(user_password_warnings[0].message(), "Password expired");

    let system: Vec<_> = store
        .search(
            &SearchQuery::new()
                .with_text("PASSWORD")
                .with_event_type(EventTypeFilter::System),
        )
        .collect();
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].topic(), "password-sync");
}

#[test]
fn test_max_results_bounds_output() {
    let store = open(MemoryQueue::new());
    for i in 0..40 {
        store.write(user_event(LogLevel::Info, "gina", &i.to_string()));
    }
    assert!(store.flush(Duration::from_secs(5)));

    let mut cursor = store.search(&SearchQuery::new().with_max_results(7));
    let first: Vec<_> = cursor.by_ref().collect();
    assert_eq!(first.len(), 7);
    assert_eq!(cursor.results_returned(), 7);
    assert!(cursor.is_truncated());
    assert!(cursor.next().is_none());

    let all = store.search(&SearchQuery::new()).into_results();
    assert_eq!(all.records.len(), 40);
    assert!(!all.truncated);
}

#[test]
fn test_max_duration_cuts_search_short() {
    let inner = MemoryQueue::new();
    let slow = SlowQueue {
        inner: inner.clone(),
        delay: Duration::from_millis(5),
    };
    let store = EventLogStore::open(quiet_settings(), Arc::new(slow), LogLevel::Trace).unwrap();
    for i in 0..500 {
        store.write(user_event(LogLevel::Info, "hank", &i.to_string()));
    }
    assert!(store.flush(Duration::from_secs(5)));

    let results = store
        .search(
            &SearchQuery::new()
                .with_max_results(10_000)
                .with_max_duration(Duration::from_millis(50)),
        )
        .into_results();
    assert!(results.truncated);
    assert!(results.records.len() < 500);
    assert!(
        results.elapsed < Duration::from_millis(500),
        "search ran {:?}",
        results.elapsed
    );
}

#[test]
fn test_undecodable_records_are_skipped() {
    let queue = MemoryQueue::new();
    queue.set_format_version(RECORD_FORMAT_VERSION).unwrap();
    let good = |msg: &str| {
        PendingMessage::new(LogLevel::Info, "t")
            .with_message(msg)
            .into_record()
            .unwrap()
            .encode()
            .unwrap()
    };
    queue
        .append_all(&[
            good("first"),
            "garbage".to_string(),
            "{\"level\":\"INFO\"}".to_string(),
            good("second"),
        ])
        .unwrap();

    let store = open(queue);
    let messages: Vec<String> = store
        .search(&SearchQuery::new())
        .map(|r| r.message().to_string())
        .collect();
    assert_eq!(messages, vec!["second", "first"]);
}

#[test]
fn test_search_runs_while_writer_appends() {
    let queue = MemoryQueue::new();
    let store = Arc::new(open(queue));
    for i in 0..200 {
        store.write(user_event(LogLevel::Info, "ivan", &format!("seed {}", i)));
    }
    assert!(store.flush(Duration::from_secs(5)));

    let mut cursor = store.search(&SearchQuery::new().with_max_results(1_000));
    let head = cursor.next().expect("first result");
    assert_eq!(head.message(), "seed 199");

    for i in 0..50 {
        store.write(user_event(LogLevel::Info, "ivan", &format!("late {}", i)));
    }
    assert!(store.flush(Duration::from_secs(5)));

    let rest: Vec<_> = cursor.collect();
    assert_eq!(rest.len(), 199);
    assert!(rest.iter().all(|r| r.message().starts_with("seed")));
}
