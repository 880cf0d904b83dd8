//! Observability hooks for refresh passes.
//!
//! Implement [`RefreshMetrics`] to feed lookup spend and degradation counts to
//! a monitoring system:
//!
//! ```ignore
//! use footfall::observability::RefreshMetrics;
//!
//! struct PrometheusMetrics;
//!
//! impl RefreshMetrics for PrometheusMetrics {
//!     fn record_fetch(&self, _query: &str, _duration: Duration) {
//!         // counter!("lookups_spent").inc();
//!     }
//!     // ... implement other methods
//! }
//!
//! // let reconciler = Reconciler::new(roster, policy, store, lookup)
//! //     .with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! The default is [`NoOpMetrics`]. The trait's own default methods log via
//! the `log` crate.

use crate::policy::ReuseReason;
use std::time::Duration;

/// Trait for refresh metrics collection.
pub trait RefreshMetrics: Send + Sync {
    /// A lookup was spent and returned a usable place.
    fn record_fetch(&self, query: &str, duration: Duration) {
        debug!("Lookup FETCH: {} took {:?}", query, duration);
    }

    /// The cached record was reused without a lookup.
    fn record_reuse(&self, query: &str, reason: ReuseReason) {
        debug!("Lookup SKIP: {} ({:?})", query, reason);
    }

    /// A lookup was spent but failed or found nothing.
    fn record_lookup_failure(&self, query: &str, error: &str) {
        warn!("Lookup FAILED for {}: {}", query, error);
    }

    /// An entity had neither a prior nor a fresh record.
    fn record_default(&self, query: &str) {
        debug!("Lookup DEFAULT: {}", query);
    }

    /// A merged snapshot was persisted.
    fn record_persist(&self, records: usize, duration: Duration) {
        debug!("Snapshot SAVE: {} records took {:?}", records, duration);
    }

    /// A pass-level error (store unreachable, unreadable snapshot).
    fn record_error(&self, error: &str) {
        warn!("Refresh ERROR: {}", error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl RefreshMetrics for NoOpMetrics {
    fn record_fetch(&self, _query: &str, _duration: Duration) {}
    fn record_reuse(&self, _query: &str, _reason: ReuseReason) {}
    fn record_lookup_failure(&self, _query: &str, _error: &str) {}
    fn record_default(&self, _query: &str) {}
    fn record_persist(&self, _records: usize, _duration: Duration) {}
    fn record_error(&self, _error: &str) {}
}

/// Per-pass tally returned with every refresh.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Lookups spent that produced a fresh record.
    pub fetched: usize,
    /// Entities served from cache by policy.
    pub reused: usize,
    /// Lookups spent that failed or found nothing.
    pub failed: usize,
    /// Entities that fell back to a synthesized default record.
    pub defaulted: usize,
    /// Whether the merged snapshot was written.
    pub persisted: bool,
    pub duration: Duration,
}

impl RefreshReport {
    /// Lookups spent this pass, successful or not.
    pub fn lookups(&self) -> usize {
        self.fetched + self.failed
    }
}
