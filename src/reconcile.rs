//! Cache reconciler - the refresh pass and the read path.
//!
//! # Read path (`force_refresh = false`)
//!
//! Loads the snapshot and re-derives open-state and busyness for every cached
//! record at the current moment. No lookups, no writes. Only when no snapshot
//! exists yet does it fall through to a forced pass.
//!
//! # Forced pass (`force_refresh = true`)
//!
//! ```text
//! for each roster entity:
//!     prior    = identity match against the snapshot
//!     decision = fetch policy(prior, entity, now)
//!     Fetch -> lookup; fresh > prior > default
//!     Reuse -> prior (recomputed)
//! persist snapshot{now, data: previous ∪ result}   (one write)
//! ```
//!
//! Passes are serialized by a mutex so two overlapping passes cannot lose each
//! other's updates.

use crate::busyness;
use crate::clock::{Clock, Moment, SystemClock};
use crate::config::{Roster, TrackerConfig};
use crate::error::{Error, Result};
use crate::identity::NameIndex;
use crate::lookup::{PlaceDetails, PlaceLookup};
use crate::observability::{NoOpMetrics, RefreshMetrics, RefreshReport};
use crate::policy::{FetchDecision, FetchPolicy};
use crate::record::{CachedRecord, CategoryData, RosterEntity, Snapshot};
use crate::schedule::{self, OpenWindow};
use crate::store::SnapshotStore;
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tokio::sync::Mutex;

/// Result of one reconcile call.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    /// Requested categories only.
    pub data: CategoryData,
    /// Epoch seconds of the snapshot the data came from.
    pub timestamp: i64,
    /// Present iff a forced pass ran.
    pub report: Option<RefreshReport>,
}

impl Reconciled {
    pub fn into_parts(self) -> (CategoryData, i64) {
        (self.data, self.timestamp)
    }
}

/// Re-derive `is_open`, `hours_known` and `busyness` at `moment`.
///
/// Known-closed forces zero load; unknown hours never do.
pub fn recompute(record: &CachedRecord, moment: &Moment, window: OpenWindow) -> CachedRecord {
    let state = schedule::evaluate(record.working_hours.as_ref(), moment, window);
    let busyness = if state.is_known_closed() {
        Some(0)
    } else if state.is_open {
        busyness::current_load(record.popular_times.as_deref(), moment)
    } else {
        None
    };

    CachedRecord {
        is_open: state.is_open,
        hours_known: state.hours_known,
        busyness,
        ..record.clone()
    }
}

/// Optimistic stand-in for an entity with neither cache nor lookup result.
pub fn default_record(entity: &RosterEntity, moment: &Moment, window: OpenWindow) -> CachedRecord {
    recompute(&CachedRecord::named(entity.display_name()), moment, window)
}

/// Turn a provider answer into a record stamped with `moment`.
///
/// Derived fields are left for [`recompute`].
pub fn fresh_record(place: PlaceDetails, entity: &RosterEntity, moment: &Moment) -> CachedRecord {
    let name = place
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| entity.display_name().to_string());

    CachedRecord {
        name,
        rating: place.rating,
        reviews: place.reviews,
        working_hours: place.working_hours,
        popular_times: place.popular_times,
        fetched_at: Some(moment.timestamp),
        ..CachedRecord::named("")
    }
}

/// Three-way merge with precedence fresh > prior > default.
///
/// A fresh record missing schedule, histogram, rating or review count keeps
/// the prior's value for that field.
pub fn merge(
    prior: Option<&CachedRecord>,
    fresh: Option<CachedRecord>,
    default: CachedRecord,
) -> CachedRecord {
    match (fresh, prior) {
        (Some(fresh), Some(prior)) => CachedRecord {
            rating: fresh.rating.or(prior.rating),
            reviews: fresh.reviews.or(prior.reviews),
            working_hours: fresh.working_hours.or_else(|| prior.working_hours.clone()),
            popular_times: fresh.popular_times.or_else(|| prior.popular_times.clone()),
            ..fresh
        },
        (Some(fresh), None) => fresh,
        (None, Some(prior)) => prior.clone(),
        (None, None) => default,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Fetched,
    Reused,
    Degraded { defaulted: bool },
}

struct EntityResult {
    record: CachedRecord,
    outcome: Outcome,
}

/// Refresh orchestrator over one roster, one store, and one lookup provider.
///
/// # Example
///
/// ```ignore
/// use footfall::{Reconciler, TrackerConfig};
/// use footfall::store::FileStore;
///
/// let config = TrackerConfig::from_file("tracker.json")?;
/// let reconciler = Reconciler::from_config(&config, FileStore::new(&config.cache_file), lookup);
///
/// // On every request
/// let (data, timestamp) = reconciler.reconcile(None, false).await?.into_parts();
///
/// // From the scheduler
/// reconciler.refresh(None).await?;
/// ```
pub struct Reconciler<S: SnapshotStore, L: PlaceLookup> {
    roster: Roster,
    policy: FetchPolicy,
    store: S,
    lookup: L,
    clock: Box<dyn Clock>,
    metrics: Box<dyn RefreshMetrics>,
    max_concurrency: usize,
    refresh_guard: Mutex<()>,
}

impl<S: SnapshotStore, L: PlaceLookup> Reconciler<S, L> {
    pub fn new(roster: Roster, policy: FetchPolicy, store: S, lookup: L) -> Self {
        Reconciler {
            roster,
            policy,
            store,
            lookup,
            clock: Box::new(SystemClock),
            metrics: Box::new(NoOpMetrics),
            max_concurrency: 1,
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn from_config(config: &TrackerConfig, store: S, lookup: L) -> Self {
        Reconciler::new(config.roster(), config.fetch_policy(), store, lookup)
            .with_concurrency(config.max_concurrency)
    }

    /// Set the clock every pass reads "now" from.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn RefreshMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Allow up to `n` lookups in flight per category. Results keep roster
    /// order and still commit in one write.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    pub fn now(&self) -> Moment {
        self.clock.now()
    }

    /// Return every requested category with derived fields current.
    ///
    /// With `force_refresh = false` this never calls the lookup provider
    /// unless nothing has ever been persisted, and never fails: a snapshot
    /// that cannot be saved on that first pass is logged and the data is
    /// still returned.
    ///
    /// # Errors
    /// With `force_refresh = true`, returns `Error::StoreError` if the merged
    /// snapshot cannot be persisted.
    pub async fn reconcile(
        &self,
        categories: Option<&[String]>,
        force_refresh: bool,
    ) -> Result<Reconciled> {
        let categories = self.requested(categories);

        if !force_refresh {
            let snapshot = self.load_snapshot().await;
            if !snapshot.is_empty() {
                let moment = self.clock.now();
                return Ok(Reconciled {
                    data: self.read_cached(&snapshot, &categories, &moment),
                    timestamp: snapshot.timestamp,
                    report: None,
                });
            }
            debug!("No snapshot yet, running a first refresh pass");
        }

        let _guard = self.refresh_guard.lock().await;
        self.forced_pass(&categories, force_refresh).await
    }

    /// Forced pass over the given categories (all when `None`), waiting for
    /// any pass already running.
    ///
    /// # Errors
    /// Returns `Error::StoreError` if the merged snapshot cannot be persisted.
    pub async fn refresh(&self, categories: Option<&[String]>) -> Result<Reconciled> {
        self.reconcile(categories, true).await
    }

    /// Forced pass over every category, unless one is already running.
    ///
    /// # Errors
    /// Returns `Error::RefreshInProgress` if a pass holds the guard, or
    /// `Error::StoreError` if the snapshot cannot be persisted.
    pub async fn try_refresh(&self) -> Result<Reconciled> {
        let _guard = self
            .refresh_guard
            .try_lock()
            .map_err(|_| Error::RefreshInProgress)?;
        let categories = self.requested(None);
        self.forced_pass(&categories, true).await
    }

    /// Load the snapshot; unreadable counts as empty.
    pub async fn load_snapshot(&self) -> Snapshot {
        match self.store.load().await {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!("Snapshot unreadable, treating as empty: {}", e);
                self.metrics.record_error(&e.to_string());
                Snapshot::default()
            }
        }
    }

    fn requested(&self, categories: Option<&[String]>) -> Vec<String> {
        match categories {
            None => self.roster.categories().map(str::to_string).collect(),
            Some(list) => {
                let mut wanted: Vec<String> = Vec::with_capacity(list.len());
                for category in list {
                    if !self.roster.contains(category) {
                        warn!("Ignoring unknown category '{}'", category);
                    } else if !wanted.contains(category) {
                        wanted.push(category.clone());
                    }
                }
                wanted
            }
        }
    }

    fn read_cached(
        &self,
        snapshot: &Snapshot,
        categories: &[String],
        moment: &Moment,
    ) -> CategoryData {
        let window = self.policy.default_window;
        categories
            .iter()
            .map(|category| {
                let records = match snapshot.data.get(category) {
                    Some(records) => records
                        .iter()
                        .map(|r| recompute(r, moment, window))
                        .collect(),
                    None => self
                        .roster
                        .entities(category)
                        .iter()
                        .map(|e| default_record(e, moment, window))
                        .collect(),
                };
                (category.clone(), records)
            })
            .collect()
    }

    /// Caller holds `refresh_guard`.
    async fn forced_pass(&self, categories: &[String], force_refresh: bool) -> Result<Reconciled> {
        let timer = Instant::now();
        let snapshot = self.load_snapshot().await;
        let moment = self.clock.now();

        if !force_refresh && !snapshot.is_empty() {
            // Another pass persisted while we waited for the guard.
            return Ok(Reconciled {
                data: self.read_cached(&snapshot, categories, &moment),
                timestamp: snapshot.timestamp,
                report: None,
            });
        }

        let index = NameIndex::from_snapshot(&snapshot);
        let mut report = RefreshReport::default();
        let mut result = CategoryData::new();

        for category in categories {
            let entities = self.roster.entities(category);
            let pending: Vec<_> = entities
                .iter()
                .map(|entity| self.refresh_entity(entity, &index, &moment))
                .collect();
            let outcomes: Vec<EntityResult> = stream::iter(pending)
                .buffered(self.max_concurrency)
                .collect()
                .await;

            let mut records = Vec::with_capacity(outcomes.len());
            for entity_result in outcomes {
                match entity_result.outcome {
                    Outcome::Fetched => report.fetched += 1,
                    Outcome::Reused => report.reused += 1,
                    Outcome::Degraded { defaulted } => {
                        report.failed += 1;
                        if defaulted {
                            report.defaulted += 1;
                        }
                    }
                }
                records.push(entity_result.record);
            }
            result.insert(category.clone(), records);
        }

        let mut merged = snapshot.data;
        for (category, records) in &result {
            merged.insert(category.clone(), records.clone());
        }
        let next = Snapshot::new(moment.timestamp, merged);

        let save_timer = Instant::now();
        match self.store.save(&next).await {
            Ok(()) => {
                report.persisted = true;
                self.metrics.record_persist(next.len(), save_timer.elapsed());
            }
            Err(e) => {
                error!("✗ Failed to persist snapshot: {}", e);
                self.metrics.record_error(&e.to_string());
                if force_refresh {
                    return Err(e);
                }
            }
        }

        report.duration = timer.elapsed();
        info!(
            "✓ Refresh pass: {} fetched, {} reused, {} failed, {} defaulted in {:?}",
            report.fetched, report.reused, report.failed, report.defaulted, report.duration
        );

        Ok(Reconciled {
            data: result,
            timestamp: moment.timestamp,
            report: Some(report),
        })
    }

    async fn refresh_entity(
        &self,
        entity: &RosterEntity,
        index: &NameIndex,
        moment: &Moment,
    ) -> EntityResult {
        let window = self.policy.default_window;
        let prior = index.resolve(&entity.query).map(|(record, kind)| {
            if record.name != entity.query {
                debug!("'{}' matched cached '{}' ({})", entity.query, record.name, kind);
            }
            record
        });

        let decision = self.policy.decide(prior, entity, moment);
        debug!("» {} -> {}", entity.query, decision);

        if let FetchDecision::Reuse(reason) = decision {
            self.metrics.record_reuse(&entity.query, reason);
            let record = merge(prior, None, default_record(entity, moment, window));
            return EntityResult {
                record: recompute(&record, moment, window),
                outcome: Outcome::Reused,
            };
        }

        let timer = Instant::now();
        let fresh = match self.lookup.lookup(&entity.query).await {
            Ok(Some(place)) => {
                self.metrics.record_fetch(&entity.query, timer.elapsed());
                Some(fresh_record(place, entity, moment))
            }
            Ok(None) => {
                self.metrics
                    .record_lookup_failure(&entity.query, "no matching place");
                None
            }
            Err(e) => {
                warn!("Lookup failed for '{}', keeping cached data: {}", entity.query, e);
                self.metrics
                    .record_lookup_failure(&entity.query, &e.to_string());
                None
            }
        };

        let outcome = match (&fresh, prior) {
            (Some(_), _) => Outcome::Fetched,
            (None, prior) => {
                if prior.is_none() {
                    self.metrics.record_default(&entity.query);
                }
                Outcome::Degraded {
                    defaulted: prior.is_none(),
                }
            }
        };

        let record = merge(prior, fresh, default_record(entity, moment, window));
        EntityResult {
            record: recompute(&record, moment, window),
            outcome,
        }
    }
}
