//! Integration tests for footfall
//!
//! These tests verify end-to-end refresh behavior across all components:
//! roster → identity → policy → lookup → merge → store, and the read path.

use chrono::{NaiveDate, NaiveDateTime};
use footfall::clock::WEEKDAYS;
use footfall::lookup::InMemoryLookup;
use footfall::record::{DayHistogram, HourLoad, WorkingHours};
use footfall::store::{FileStore, InMemoryStore, SnapshotStore};
use footfall::{
    CachedRecord, CategoryData, Error, FetchPolicy, FixedClock, LoadSignalList, PlaceDetails,
    PlaceLookup, Reconciler, Roster, Snapshot,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// 2024-01-01 is a Monday.
fn monday(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn every_day(slots: &[&str]) -> WorkingHours {
    WEEKDAYS
        .iter()
        .map(|day| {
            (
                day.to_string(),
                slots.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

fn monday_load(hour: u32, percentage: u32) -> Vec<DayHistogram> {
    vec![DayHistogram {
        day: 1,
        popular_times: vec![HourLoad { hour, percentage }],
    }]
}

fn single_entity(
    store: InMemoryStore,
    lookup: InMemoryLookup,
    clock: FixedClock,
) -> Reconciler<InMemoryStore, InMemoryLookup> {
    Reconciler::new(
        Roster::new().with_entity("plaza", "A, City"),
        FetchPolicy::new(LoadSignalList::new(["A"])),
        store,
        lookup,
    )
    .with_clock(Box::new(clock))
}

/// Test 1: Closed all week
///
/// No prior cache, lookup answers with a schedule that is closed every day:
/// - Record is closed with known hours
/// - Busyness is exactly 0
/// - Snapshot is persisted
#[tokio::test]
async fn test_end_to_end_closed_all_week() {
    init_logging();
    let store = InMemoryStore::new();
    let lookup = InMemoryLookup::new();
    lookup.insert(
        "A, City",
        PlaceDetails {
            working_hours: Some(every_day(&["Closed"])),
            ..PlaceDetails::named("A")
        },
    );
    let reconciler = single_entity(store.clone(), lookup.clone(), FixedClock::new(monday(13, 0)));

    let out = reconciler.reconcile(None, true).await.expect("pass failed");

    let record = &out.data["plaza"][0];
    assert_eq!(record.name, "A");
    assert!(!record.is_open);
    assert!(record.hours_known);
    assert_eq!(record.busyness, Some(0));
    assert_eq!(store.save_count(), 1);
    assert_eq!(lookup.calls("A, City"), 1);
}

/// Test 2: Lookup failure with a prior record
///
/// The only entity has a stale prior record and its lookup throws:
/// - Returned record carries recomputed open-state, not the stale flags
/// - Prior data (rating, histogram) survives
/// - Snapshot is still persisted with the new timestamp
#[tokio::test]
async fn test_failed_lookup_recomputes_prior() {
    init_logging();
    let mut prior = CachedRecord::named("A");
    prior.working_hours = Some(every_day(&["9AM-11PM"]));
    prior.popular_times = Some(monday_load(14, 70));
    prior.rating = Some(4.4);
    prior.is_open = false;
    prior.busyness = Some(0);

    let mut data = CategoryData::new();
    data.insert("plaza".to_string(), vec![prior]);
    let store = InMemoryStore::with_snapshot(&Snapshot::new(1_000, data)).expect("seed store");

    let lookup = InMemoryLookup::new();
    lookup.fail("A, City", "HTTP 503");
    let clock = FixedClock::new(monday(14, 0));
    let reconciler = single_entity(store.clone(), lookup.clone(), clock);

    let out = reconciler.reconcile(None, true).await.expect("pass failed");

    let record = &out.data["plaza"][0];
    assert!(record.is_open);
    assert!(record.hours_known);
    assert_eq!(record.busyness, Some(70));
    assert_eq!(record.rating, Some(4.4));
    assert_eq!(lookup.calls("A, City"), 1);

    let report = out.report.expect("forced pass reports");
    assert_eq!(report.failed, 1);
    assert_eq!(report.defaulted, 0);
    assert!(report.persisted);

    let persisted = store.load().await.expect("load").expect("snapshot");
    assert_eq!(persisted.timestamp, out.timestamp);
    assert!(persisted.timestamp > 1_000);
    assert_eq!(persisted.data["plaza"][0], *record);
}

/// Test 3: Read path idempotence
///
/// Two reads in immediate succession return byte-identical data, spend no
/// lookups, and write nothing.
#[tokio::test]
async fn test_read_path_is_idempotent() {
    let store = InMemoryStore::new();
    let lookup = InMemoryLookup::new();
    lookup.insert(
        "A, City",
        PlaceDetails {
            working_hours: Some(every_day(&["12PM-12AM"])),
            popular_times: Some(monday_load(18, 55)),
            ..PlaceDetails::named("A")
        },
    );
    let reconciler = single_entity(store.clone(), lookup.clone(), FixedClock::new(monday(18, 5)));
    reconciler.refresh(None).await.expect("seed pass failed");
    let saves = store.save_count();

    let first = reconciler.reconcile(None, false).await.expect("read failed");
    let second = reconciler.reconcile(None, false).await.expect("read failed");

    assert_eq!(
        serde_json::to_vec(&first.data).unwrap(),
        serde_json::to_vec(&second.data).unwrap()
    );
    assert_eq!(first.timestamp, second.timestamp);
    assert!(first.report.is_none());
    assert_eq!(first.data["plaza"][0].busyness, Some(55));
    assert_eq!(lookup.total_calls(), 1);
    assert_eq!(store.save_count(), saves);
}

/// Test 4: Read path follows the clock
///
/// A cached record read across a schedule boundary flips to closed and its
/// busyness to 0, with no lookup.
#[tokio::test]
async fn test_read_path_recomputes_across_boundary() {
    let store = InMemoryStore::new();
    let lookup = InMemoryLookup::new();
    lookup.insert(
        "A, City",
        PlaceDetails {
            working_hours: Some(every_day(&["12PM-4PM"])),
            popular_times: Some(monday_load(15, 80)),
            ..PlaceDetails::named("A")
        },
    );
    let clock = FixedClock::new(monday(15, 30));
    let reconciler = single_entity(store, lookup.clone(), clock.clone());

    let open = reconciler.refresh(None).await.expect("pass failed");
    assert_eq!(open.data["plaza"][0].busyness, Some(80));

    clock.set(monday(16, 30));
    let closed = reconciler.reconcile(None, false).await.expect("read failed");
    let record = &closed.data["plaza"][0];
    assert!(!record.is_open);
    assert!(record.hours_known);
    assert_eq!(record.busyness, Some(0));
    assert_eq!(closed.timestamp, open.timestamp);
    assert_eq!(lookup.total_calls(), 1);
}

/// Test 5: Unknown hours are never forced closed
///
/// Without a schedule, outside the default window the record reads closed
/// but its busyness stays unknown.
#[tokio::test]
async fn test_unknown_hours_never_zeroed() {
    let mut prior = CachedRecord::named("A");
    prior.popular_times = Some(monday_load(23, 35));
    let mut data = CategoryData::new();
    data.insert("plaza".to_string(), vec![prior]);
    let store = InMemoryStore::with_snapshot(&Snapshot::new(1_000, data)).expect("seed store");

    let reconciler = single_entity(store, InMemoryLookup::new(), FixedClock::new(monday(23, 30)));
    let out = reconciler.reconcile(None, false).await.expect("read failed");

    let record = &out.data["plaza"][0];
    assert!(!record.hours_known);
    assert!(!record.is_open);
    assert_eq!(record.busyness, None);
}

/// Test 6: Allow-list
///
/// Entities without a load signal are never looked up once a prior record
/// exists, whatever the hour.
#[tokio::test]
async fn test_entity_without_load_signal_is_never_fetched() {
    let store = InMemoryStore::new();
    let lookup = InMemoryLookup::new();
    lookup.insert("Alpha, City", PlaceDetails::named("Alpha"));
    lookup.insert("Dormant, City", PlaceDetails::named("Dormant"));
    let clock = FixedClock::new(monday(0, 0));

    let reconciler = Reconciler::new(
        Roster::new()
            .with_entity("plaza", "Alpha, City")
            .with_entity("plaza", "Dormant, City"),
        FetchPolicy::new(LoadSignalList::new(["Alpha"])),
        store,
        lookup.clone(),
    )
    .with_clock(Box::new(clock.clone()));

    for _ in 0..48 {
        reconciler.refresh(None).await.expect("pass failed");
        clock.advance(chrono::Duration::hours(1));
    }

    // First pass only: no prior record yet.
    assert_eq!(lookup.calls("Dormant, City"), 1);
    assert!(lookup.calls("Alpha, City") > 1);
}

/// Test 7: Identity matching across roster rewording
///
/// Cached names that drifted from the roster query still resolve, so their
/// data is carried forward instead of defaulted.
#[tokio::test]
async fn test_identity_matching_carries_prior_forward() {
    let mut preso = CachedRecord::named("La Preso");
    preso.rating = Some(4.7);
    let mut coder = CachedRecord::named("Casa Coder");
    coder.rating = Some(4.2);

    let mut data = CategoryData::new();
    data.insert("placa_mercadal".to_string(), vec![preso, coder]);
    let store = InMemoryStore::with_snapshot(&Snapshot::new(1_000, data)).expect("seed store");

    let reconciler = Reconciler::new(
        Roster::new()
            .with_entity("placa_mercadal", "La Presó, Reus")
            .with_entity("placa_mercadal", "Casa Coder, Reus"),
        FetchPolicy::new(LoadSignalList::new(Vec::<String>::new())),
        store,
        InMemoryLookup::new(),
    )
    .with_clock(Box::new(FixedClock::new(monday(13, 0))));

    let out = reconciler.refresh(None).await.expect("pass failed");
    let records = &out.data["placa_mercadal"];
    assert_eq!(records[0].name, "La Preso");
    assert_eq!(records[0].rating, Some(4.7));
    assert_eq!(records[1].name, "Casa Coder");
    assert_eq!(records[1].rating, Some(4.2));
    assert_eq!(out.report.expect("report").reused, 2);
}

/// Test 8: Categories missing from the snapshot
///
/// A roster category added after the last pass reads as optimistic defaults.
#[tokio::test]
async fn test_new_category_reads_as_defaults() {
    let mut data = CategoryData::new();
    data.insert("plaza".to_string(), vec![CachedRecord::named("A")]);
    let store = InMemoryStore::with_snapshot(&Snapshot::new(1_000, data)).expect("seed store");
    let lookup = InMemoryLookup::new();

    let reconciler = Reconciler::new(
        Roster::new()
            .with_entity("plaza", "A, City")
            .with_entity("teatre", "Oplontina, Reus"),
        FetchPolicy::default(),
        store,
        lookup.clone(),
    )
    .with_clock(Box::new(FixedClock::new(monday(12, 0))));

    let out = reconciler.reconcile(None, false).await.expect("read failed");
    let record = &out.data["teatre"][0];
    assert_eq!(record.name, "Oplontina");
    assert!(record.is_open);
    assert!(!record.hours_known);
    assert_eq!(record.busyness, None);
    assert_eq!(lookup.total_calls(), 0);
}

/// Test 9: Persistence failure
///
/// A forced pass that cannot save reports `StoreError`; the previous
/// snapshot stays in place.
#[tokio::test]
async fn test_persistence_failure_is_reported() {
    init_logging();
    let mut data = CategoryData::new();
    data.insert("plaza".to_string(), vec![CachedRecord::named("A")]);
    let seeded = Snapshot::new(1_000, data);
    let store = InMemoryStore::with_snapshot(&seeded).expect("seed store");
    store.fail_writes(true);

    let lookup = InMemoryLookup::new();
    lookup.insert("A, City", PlaceDetails::named("A renamed"));
    let reconciler = single_entity(store.clone(), lookup, FixedClock::new(monday(12, 0)));

    let err = reconciler.refresh(None).await.unwrap_err();
    assert!(matches!(err, Error::StoreError(_)));
    assert_eq!(store.load().await.expect("load"), Some(seeded));
}

/// Test 10: Corrupt snapshot
///
/// An undecodable snapshot is treated as absent and replaced by the next pass.
#[tokio::test]
async fn test_corrupt_snapshot_is_rebuilt() {
    init_logging();
    let store = InMemoryStore::new();
    store.seed(b"{\"timestamp\": ".to_vec());
    let lookup = InMemoryLookup::new();
    lookup.insert("A, City", PlaceDetails::named("A"));
    let reconciler = single_entity(store.clone(), lookup.clone(), FixedClock::new(monday(12, 0)));

    let out = reconciler.reconcile(None, false).await.expect("read failed");
    assert_eq!(out.data["plaza"][0].name, "A");
    assert_eq!(lookup.total_calls(), 1);
    assert!(store.load().await.expect("load").is_some());
}

/// Lookup that records how many calls overlap.
#[derive(Clone, Default)]
struct SlowLookup {
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl PlaceLookup for SlowLookup {
    async fn lookup(&self, query: &str) -> footfall::Result<Option<PlaceDetails>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(10)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(PlaceDetails::named(
            query.split(',').next().unwrap_or(query),
        )))
    }
}

/// Test 11: Mutual exclusion
///
/// Two overlapping forced passes run one after the other; neither loses the
/// other's write and lookups never overlap.
#[tokio::test]
async fn test_concurrent_passes_are_serialized() {
    init_logging();
    let store = InMemoryStore::new();
    let lookup = SlowLookup::default();
    let reconciler = Reconciler::new(
        Roster::new()
            .with_entity("plaza", "A, City")
            .with_entity("plaza", "B, City"),
        FetchPolicy::new(LoadSignalList::new(["A", "B"])),
        store.clone(),
        lookup.clone(),
    )
    .with_clock(Box::new(FixedClock::new(monday(12, 0))));

    let (first, second) = tokio::join!(reconciler.refresh(None), reconciler.refresh(None));
    first.expect("first pass failed");
    second.expect("second pass failed");

    assert_eq!(lookup.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 4);
    assert_eq!(store.save_count(), 2);

    let persisted = store.load().await.expect("load").expect("snapshot");
    assert_eq!(persisted.data["plaza"].len(), 2);
}

/// Test 12: try_refresh while a pass is running
#[tokio::test]
async fn test_try_refresh_rejects_overlap() {
    let lookup = SlowLookup::default();
    let reconciler = Reconciler::new(
        Roster::new().with_entity("plaza", "A, City"),
        FetchPolicy::default(),
        InMemoryStore::new(),
        lookup,
    )
    .with_clock(Box::new(FixedClock::new(monday(12, 0))));

    let (running, rejected) = tokio::join!(reconciler.refresh(None), async {
        tokio::task::yield_now().await;
        reconciler.try_refresh().await
    });

    running.expect("pass failed");
    assert!(matches!(rejected, Err(Error::RefreshInProgress)));
}

/// Test 13: File-backed round trip
///
/// A pass writes the snapshot file; a second process reading the same file
/// serves it without any lookup.
#[tokio::test]
async fn test_file_store_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("data/restaurants_cache.json");
    let clock = FixedClock::new(monday(19, 0));

    let lookup = InMemoryLookup::new();
    lookup.insert(
        "A, City",
        PlaceDetails {
            working_hours: Some(every_day(&["7PM-11PM"])),
            popular_times: Some(monday_load(19, 45)),
            ..PlaceDetails::named("A")
        },
    );
    let writer = Reconciler::new(
        Roster::new().with_entity("plaza", "A, City"),
        FetchPolicy::new(LoadSignalList::new(["A"])),
        FileStore::new(path.clone()),
        lookup,
    )
    .with_clock(Box::new(clock.clone()));
    let written = writer.refresh(None).await.expect("pass failed");

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("snapshot file")).unwrap();
    assert_eq!(raw["data"]["plaza"][0]["name"], "A");
    assert_eq!(raw["timestamp"], written.timestamp);

    let silent = InMemoryLookup::new();
    let reader = Reconciler::new(
        Roster::new().with_entity("plaza", "A, City"),
        FetchPolicy::new(LoadSignalList::new(["A"])),
        FileStore::new(path),
        silent.clone(),
    )
    .with_clock(Box::new(clock));
    let read = reader.reconcile(None, false).await.expect("read failed");

    assert_eq!(read.data, written.data);
    assert_eq!(read.data["plaza"][0].busyness, Some(45));
    assert_eq!(silent.total_calls(), 0);
}
