//! Integration tests for count and age retention
//!
//! Cleanup cycles are driven synchronously with `run_cleanup()`; the
//! background cleaner is parked on a long interval.

mod common;

use chrono::Duration as ChronoDuration;
use common::{event_at, quiet_settings, timestamps};
use eventstore_core::{LogLevel, RECORD_FORMAT_VERSION};
use eventstore_engine::{EventLogStore, SearchQuery, StoreSettings, RETENTION_FLOOR};
use eventstore_storage::{MemoryQueue, PersistentQueue};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_count_cap_trims_oldest() {
    let queue = MemoryQueue::new();
    let settings = StoreSettings {
        max_events: 100,
        max_age: Some(Duration::from_secs(3600)),
        ..quiet_settings()
    };
    let store = EventLogStore::open(settings, Arc::new(queue.clone()), LogLevel::Info).unwrap();

    for (i, ts) in timestamps(150, ChronoDuration::zero()).into_iter().enumerate() {
        store.write(event_at(ts, &format!("event-{}", i)));
    }
    assert!(store.flush(Duration::from_secs(5)));
    assert_eq!(queue.size(), 150);

    assert_eq!(store.run_cleanup(), 50);
    assert!(store.stored_count() <= 100);

    let found: HashSet<String> = store
        .search(&SearchQuery::new().with_max_results(1_000))
        .map(|r| r.message().to_string())
        .collect();
    assert_eq!(found.len(), 100);
    for i in 0..50 {
        assert!(!found.contains(&format!("event-{}", i)), "event-{} should be evicted", i);
    }
    for i in 50..150 {
        assert!(found.contains(&format!("event-{}", i)));
    }
}

#[test]
fn test_cleanup_never_trims_below_floor() {
    let queue = MemoryQueue::new();
    let settings = StoreSettings {
        max_events: 100,
        max_trim_size: 7,
        ..quiet_settings()
    };
    let store = EventLogStore::open(settings, Arc::new(queue.clone()), LogLevel::Info).unwrap();

    for ts in timestamps(120, ChronoDuration::hours(5)) {
        store.write(event_at(ts, "stale"));
    }
    assert!(store.flush(Duration::from_secs(5)));

    for _ in 0..3 {
        store.run_cleanup();
        assert!(store.stored_count() >= RETENTION_FLOOR);
    }
    assert_eq!(store.stored_count(), RETENTION_FLOOR);
}

#[test]
fn test_sustained_overflow_converges_to_cap() {
    let queue = MemoryQueue::new();
    let settings = StoreSettings {
        max_events: 200,
        max_trim_size: 50,
        ..quiet_settings()
    };
    let store = EventLogStore::open(settings, Arc::new(queue.clone()), LogLevel::Info).unwrap();

    for round in 0..5 {
        for i in 0..150 {
            store.write(
                event_at(chrono::Utc::now(), &format!("round {} event {}", round, i)),
            );
        }
        assert!(store.flush(Duration::from_secs(5)));
        store.run_cleanup();
        assert!(
            store.stored_count() <= 200 + 50,
            "stored {} after round {}",
            store.stored_count(),
            round
        );
    }
    assert_eq!(store.stored_count(), 200);
}

#[test]
fn test_expired_records_are_eroded() {
    let queue = MemoryQueue::new();
    let store =
        EventLogStore::open(quiet_settings(), Arc::new(queue.clone()), LogLevel::Info).unwrap();

    for ts in timestamps(50, ChronoDuration::hours(3)) {
        store.write(event_at(ts, "expired"));
    }
    for ts in timestamps(101, ChronoDuration::zero()) {
        store.write(event_at(ts, "fresh"));
    }
    assert!(store.flush(Duration::from_secs(5)));
    assert_eq!(store.stored_count(), 151);

    assert_eq!(store.run_cleanup(), 50);
    assert_eq!(store.stored_count(), 101);
    let oldest = store.tail_timestamp().expect("tail");
    assert!(chrono::Utc::now() - oldest < ChronoDuration::hours(1));
    assert!(store
        .search(&SearchQuery::new().with_text("expired"))
        .next()
        .is_none());
}

#[test]
fn test_corrupt_tail_is_removed() {
    let queue = MemoryQueue::new();
    queue.set_format_version(RECORD_FORMAT_VERSION).unwrap();
    queue.append_all(&["{not json".to_string()]).unwrap();

    let store =
        EventLogStore::open(quiet_settings(), Arc::new(queue.clone()), LogLevel::Info).unwrap();
    for ts in timestamps(150, ChronoDuration::zero()) {
        store.write(event_at(ts, "valid"));
    }
    assert!(store.flush(Duration::from_secs(5)));
    assert_eq!(queue.size(), 151);

    assert_eq!(store.run_cleanup(), 1);
    assert_eq!(queue.size(), 150);
    assert!(store.tail_timestamp().is_some());
}

#[test]
fn test_background_cleaner_runs_on_interval() {
    let queue = MemoryQueue::new();
    let settings = StoreSettings {
        max_events: 100,
        cleanup_interval: Some(Duration::from_millis(50)),
        ..quiet_settings()
    };
    let store = EventLogStore::open(settings, Arc::new(queue.clone()), LogLevel::Info).unwrap();
    for ts in timestamps(130, ChronoDuration::zero()) {
        store.write(event_at(ts, "x"));
    }
    assert!(store.flush(Duration::from_secs(5)));

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while store.stored_count() > 100 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(store.stored_count(), 100);
    assert!(store.stats().cleanup_cycles >= 1);
}
