//! Caller-facing busyness service.
//!
//! Provides a convenient wrapper around [`Reconciler`] with Arc for easy
//! sharing between request handlers and the refresh scheduler.

use crate::busyness::{self, LoadSample};
use crate::error::Result;
use crate::lookup::PlaceLookup;
use crate::reconcile::{Reconciled, Reconciler};
use crate::record::CategoryData;
use crate::store::SnapshotStore;
use std::sync::Arc;
use std::time::Duration;

/// High-level busyness service.
///
/// Wraps `Reconciler` in `Arc`. The reconciler only takes `&self` and
/// serializes forced passes internally, so clones can be handed to every
/// request handler and to the scheduler without an outer `Mutex`.
///
/// # Example
///
/// ```ignore
/// use footfall::{BusynessService, Reconciler, TrackerConfig};
/// use footfall::store::FileStore;
///
/// let config = TrackerConfig::from_file("tracker.json")?;
/// let service = BusynessService::new(Reconciler::from_config(
///     &config,
///     FileStore::new(&config.cache_file),
///     lookup,
/// ));
///
/// // Request handler
/// let (data, timestamp) = service.fetch(None).await?;
///
/// // Every 15 minutes
/// let scheduler = service.clone();
/// tokio::spawn(async move {
///     loop {
///         let _ = scheduler.refresh_if_stale(config.snapshot_max_age()).await;
///         tokio::time::sleep(Duration::from_secs(60)).await;
///     }
/// });
/// ```
pub struct BusynessService<S: SnapshotStore, L: PlaceLookup> {
    reconciler: Arc<Reconciler<S, L>>,
}

impl<S: SnapshotStore, L: PlaceLookup> Clone for BusynessService<S, L> {
    fn clone(&self) -> Self {
        BusynessService {
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

impl<S: SnapshotStore, L: PlaceLookup> BusynessService<S, L> {
    pub fn new(reconciler: Reconciler<S, L>) -> Self {
        BusynessService {
            reconciler: Arc::new(reconciler),
        }
    }

    /// Current data for the requested categories (all when `None`).
    ///
    /// Never spends a lookup once a snapshot exists.
    ///
    /// # Errors
    /// In practice none; the signature leaves room for stores that must fail
    /// the read path.
    pub async fn fetch(&self, categories: Option<&[String]>) -> Result<(CategoryData, i64)> {
        Ok(self.reconciler.reconcile(categories, false).await?.into_parts())
    }

    /// Run a forced pass over every category, waiting for a running one.
    ///
    /// # Errors
    /// Returns `Error::StoreError` if the snapshot cannot be persisted.
    pub async fn refresh(&self) -> Result<Reconciled> {
        self.reconciler.refresh(None).await
    }

    /// Run a forced pass unless one is already running.
    ///
    /// # Errors
    /// Returns `Error::RefreshInProgress` or `Error::StoreError`.
    pub async fn try_refresh(&self) -> Result<Reconciled> {
        self.reconciler.try_refresh().await
    }

    /// Run a forced pass only when the snapshot is missing or older than
    /// `max_age`. Returns `None` when the snapshot was fresh enough.
    ///
    /// # Errors
    /// Returns `Error::StoreError` if the snapshot cannot be persisted.
    pub async fn refresh_if_stale(&self, max_age: Duration) -> Result<Option<Reconciled>> {
        let snapshot = self.reconciler.load_snapshot().await;
        let age = snapshot.age_secs(self.reconciler.now().timestamp);

        if !snapshot.is_empty() && age < max_age.as_secs() {
            debug!("Snapshot is {}s old, skipping refresh", age);
            return Ok(None);
        }

        info!("Snapshot is {}s old, refreshing", age);
        self.refresh().await.map(Some)
    }

    /// Samples for an external time-series store, taken from a fresh read.
    ///
    /// # Errors
    /// Same as [`fetch`](Self::fetch).
    pub async fn history(&self) -> Result<(Vec<LoadSample>, i64)> {
        let (data, timestamp) = self.fetch(None).await?;
        Ok((busyness::history_samples(&data), timestamp))
    }

    /// Get a reference to the underlying reconciler.
    pub fn reconciler(&self) -> &Reconciler<S, L> {
        &self.reconciler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::Roster;
    use crate::lookup::{InMemoryLookup, PlaceDetails};
    use crate::policy::{FetchPolicy, LoadSignalList};
    use crate::record::{DayHistogram, HourLoad};
    use crate::store::InMemoryStore;
    use chrono::{NaiveDate, NaiveDateTime};

    fn monday_noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn service(
        lookup: InMemoryLookup,
        clock: FixedClock,
    ) -> BusynessService<InMemoryStore, InMemoryLookup> {
        let roster = Roster::new().with_entity("plaza", "A, City");
        let policy = FetchPolicy::new(LoadSignalList::new(["A"]));
        BusynessService::new(
            Reconciler::new(roster, policy, InMemoryStore::new(), lookup)
                .with_clock(Box::new(clock)),
        )
    }

    fn busy_place() -> PlaceDetails {
        PlaceDetails {
            popular_times: Some(vec![DayHistogram {
                day: 1,
                popular_times: vec![HourLoad {
                    hour: 12,
                    percentage: 40,
                }],
            }]),
            ..PlaceDetails::named("A")
        }
    }

    #[test]
    fn test_service_clone() {
        let service1 = service(InMemoryLookup::new(), FixedClock::new(monday_noon()));
        let service2 = service1.clone();

        assert!(Arc::ptr_eq(&service1.reconciler, &service2.reconciler));
    }

    #[tokio::test]
    async fn test_fetch_bootstraps_then_reads() {
        let lookup = InMemoryLookup::new();
        lookup.insert("A, City", busy_place());
        let service = service(lookup.clone(), FixedClock::new(monday_noon()));

        let (data, timestamp) = service.fetch(None).await.expect("fetch failed");
        assert_eq!(data["plaza"][0].busyness, Some(40));
        assert_eq!(lookup.total_calls(), 1);

        let (again, same_timestamp) = service.fetch(None).await.expect("fetch failed");
        assert_eq!(again, data);
        assert_eq!(same_timestamp, timestamp);
        assert_eq!(lookup.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_if_stale() {
        let lookup = InMemoryLookup::new();
        lookup.insert("A, City", busy_place());
        let clock = FixedClock::new(monday_noon());
        let service = service(lookup.clone(), clock.clone());
        let max_age = Duration::from_secs(900);

        assert!(service
            .refresh_if_stale(max_age)
            .await
            .expect("refresh failed")
            .is_some());

        clock.advance(chrono::Duration::minutes(5));
        assert!(service
            .refresh_if_stale(max_age)
            .await
            .expect("refresh failed")
            .is_none());

        clock.advance(chrono::Duration::minutes(15));
        assert!(service
            .refresh_if_stale(max_age)
            .await
            .expect("refresh failed")
            .is_some());
        assert_eq!(lookup.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_history_samples() {
        let lookup = InMemoryLookup::new();
        lookup.insert("A, City", busy_place());
        let service = service(lookup, FixedClock::new(monday_noon()));

        let (samples, _) = service.history().await.expect("history failed");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].busyness, 40);
    }

    #[tokio::test]
    async fn test_service_thread_safety() {
        let lookup = InMemoryLookup::new();
        lookup.insert("A, City", busy_place());
        let service = service(lookup.clone(), FixedClock::new(monday_noon()));
        service.refresh().await.expect("refresh failed");

        let mut handles = vec![];
        for _ in 0..5 {
            let service_clone = service.clone();
            handles.push(tokio::spawn(async move {
                let (data, _) = service_clone.fetch(None).await.expect("fetch failed");
                assert_eq!(data["plaza"].len(), 1);
            }));
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }
        assert_eq!(lookup.total_calls(), 1);
    }
}
