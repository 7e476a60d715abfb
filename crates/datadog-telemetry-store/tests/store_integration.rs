// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use datadog_telemetry_store::{
    Migration, ProcessIdentifier, SessionIdentifier, SessionRecord, SessionState, SpanRecord,
    StorageMechanism, Store, StoreError, StoreOptions,
};
use proptest::prelude::*;
use tempfile::TempDir;
use time::OffsetDateTime;

static NEXT_STORE: AtomicUsize = AtomicUsize::new(0);

fn memory_store(process_id: ProcessIdentifier) -> Store {
    let name = format!("store-it-{}", NEXT_STORE.fetch_add(1, Ordering::Relaxed));
    Store::open(StoreOptions::new(StorageMechanism::in_memory(name), process_id)).unwrap()
}

fn at(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(seconds).unwrap()
}

fn span(id: &str, process_id: &ProcessIdentifier, end: Option<i64>) -> SpanRecord {
    SpanRecord {
        id: id.to_string(),
        name: format!("span-{id}"),
        trace_id: "trace-1".to_string(),
        kind: "performance".to_string(),
        data: vec![1, 2, 3],
        start_time: at(0),
        end_time: end.map(at),
        process_id: process_id.clone(),
    }
}

#[test]
fn test_on_disk_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let process = ProcessIdentifier::random();
    let options = StoreOptions::new(
        StorageMechanism::on_disk(dir.path(), "telemetry.sqlite"),
        process.clone(),
    );
    let session = SessionRecord::new(
        SessionIdentifier::random(),
        process,
        SessionState::Foreground,
        "trace",
        "span",
        at(10),
    );

    {
        let store = Store::open(options.clone()).unwrap();
        store.insert_session(session.clone()).unwrap();
    }

    let store = Store::open(options).unwrap();
    assert_eq!(store.fetch_session(&session.id).unwrap(), Some(session));
}

/// A damaged file is replaced by an empty store instead of failing the open.
#[test]
fn test_corrupted_file_is_recreated() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("telemetry.sqlite"), vec![0xAB; 4096]).unwrap();

    let store = Store::open(StoreOptions::new(
        StorageMechanism::on_disk(dir.path(), "telemetry.sqlite"),
        ProcessIdentifier::random(),
    ))
    .unwrap();

    assert!(store.fetch_all::<SessionRecord>().unwrap().is_empty());
    assert_eq!(store.perform_migration(false).unwrap(), 5);
}

#[test]
fn test_unsupported_storage_configuration_is_rejected() {
    let result = Store::open(StoreOptions::new(
        StorageMechanism::on_disk("/tmp", ""),
        ProcessIdentifier::random(),
    ));
    assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
}

#[test]
fn test_failed_migration_propagates_when_reset_is_disabled() {
    let store = memory_store(ProcessIdentifier::random());
    store
        .insert_span(span("kept", store.process_id(), None))
        .unwrap();
    let clashing = vec![Migration {
        version: 6,
        name: "clashing",
        sql: "CREATE TABLE spans (id TEXT)",
    }];

    let result = store.perform_migration_with(clashing, false);

    assert!(matches!(
        result,
        Err(StoreError::MigrationFailed { version: 6, .. })
    ));
    assert!(store.fetch_span("kept", "trace-1").unwrap().is_some());
}

#[test]
fn test_failed_migration_resets_store_by_default() {
    let store = memory_store(ProcessIdentifier::random());
    store
        .insert_span(span("lost", store.process_id(), None))
        .unwrap();
    let clashing = vec![Migration {
        version: 6,
        name: "clashing",
        sql: "CREATE TABLE spans (id TEXT)",
    }];

    // The table only clashes with the existing schema, so it applies after the wipe.
    assert_eq!(store.perform_migration_with(clashing, true).unwrap(), 6);

    let remaining: i64 = store
        .execute(|conn| Ok(conn.query_row("SELECT count(*) FROM spans", [], |row| row.get(0))?))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn test_upsert_span_replaces_by_id_and_trace() {
    let store = memory_store(ProcessIdentifier::random());
    let process = store.process_id().clone();
    store.upsert_span(span("a", &process, None)).unwrap();
    store.upsert_span(span("a", &process, Some(5))).unwrap();

    let mut other_trace = span("a", &process, None);
    other_trace.trace_id = "trace-2".to_string();
    store.upsert_span(other_trace).unwrap();

    assert_eq!(store.fetch_all::<SpanRecord>().unwrap().len(), 2);
    assert_eq!(
        store.fetch_span("a", "trace-1").unwrap().unwrap().end_time,
        Some(at(5))
    );
}

#[test]
fn test_close_open_spans_only_touches_previous_process() {
    let current = ProcessIdentifier::random();
    let previous = ProcessIdentifier::new("0BADF00D").unwrap();
    let store = memory_store(current.clone());
    store.insert_span(span("orphan", &previous, None)).unwrap();
    store.insert_span(span("running", &current, None)).unwrap();
    store.insert_span(span("done", &previous, Some(3))).unwrap();

    assert_eq!(store.close_open_spans(at(50)).unwrap(), 1);

    let orphan = store.fetch_span("orphan", "trace-1").unwrap().unwrap();
    let running = store.fetch_span("running", "trace-1").unwrap().unwrap();
    let done = store.fetch_span("done", "trace-1").unwrap().unwrap();
    assert_eq!(orphan.end_time, Some(at(50)));
    assert!(running.is_open());
    assert_eq!(done.end_time, Some(at(3)));
}

#[tokio::test]
async fn test_async_variants_share_the_serial_queue() {
    let store = memory_store(ProcessIdentifier::random());
    let process = store.process_id().clone();

    let write = store.upsert_span_async(span("queued", &process, Some(1)));
    let read = store.fetch_all_async::<SpanRecord>();

    write.await.unwrap();
    assert_eq!(read.await.unwrap().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_clean_up_spans_respects_cutoff(
        ends in prop::collection::vec(prop::option::of(0i64..100), 0..20),
        cutoff in prop::option::of(0i64..100),
    ) {
        let store = memory_store(ProcessIdentifier::random());
        let process = store.process_id().clone();
        for (index, end) in ends.iter().enumerate() {
            store.insert_span(span(&index.to_string(), &process, *end)).unwrap();
        }

        store.clean_up_spans(cutoff.map(at)).unwrap();

        let remaining: HashSet<String> = store
            .fetch_all::<SpanRecord>()
            .unwrap()
            .into_iter()
            .map(|span| span.id)
            .collect();
        for (index, end) in ends.iter().enumerate() {
            let kept = remaining.contains(&index.to_string());
            match (end, cutoff) {
                (None, _) => prop_assert!(kept, "open span {} was deleted", index),
                (Some(_), None) => prop_assert!(!kept),
                (Some(end), Some(cutoff)) => prop_assert_eq!(kept, *end > cutoff),
            }
        }
    }
}
