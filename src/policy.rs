//! Fetch policy: is a paid lookup worth it for this entity, this cycle?
//!
//! # Decision order
//!
//! ```text
//! no prior record ..................... Fetch   (baseline identity and schedule)
//! not on the load-signal allow-list ... Reuse   (unless the re-probe window is due)
//! known hours, closed now ............. Reuse   (no new sample possible)
//! unknown hours, outside window ....... Reuse
//! otherwise ........................... Fetch
//! ```
//!
//! The allow-list and closed-state skips bound the lookups per cycle to about
//! the number of open, signal-bearing entities, whatever the roster size.

use crate::clock::Moment;
use crate::record::{CachedRecord, RosterEntity};
use crate::schedule::{self, OpenWindow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Minimum gap between two re-probes of a dormant entity (20 hours).
pub const DEFAULT_REPROBE_INTERVAL_SECS: u64 = 20 * 60 * 60;

/// Why a lookup was selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchReason {
    NoPriorRecord,
    LikelyOpen,
    Reprobe,
}

/// Why the cached record was reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReuseReason {
    NoLoadSignal,
    KnownClosed,
    OutsideDefaultWindow,
}

/// Outcome of the fetch policy for one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchDecision {
    Fetch(FetchReason),
    Reuse(ReuseReason),
}

impl FetchDecision {
    pub fn should_fetch(&self) -> bool {
        matches!(self, FetchDecision::Fetch(_))
    }
}

impl std::fmt::Display for FetchDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchDecision::Fetch(FetchReason::NoPriorRecord) => write!(f, "Fetch (no prior record)"),
            FetchDecision::Fetch(FetchReason::LikelyOpen) => write!(f, "Fetch (open)"),
            FetchDecision::Fetch(FetchReason::Reprobe) => write!(f, "Fetch (re-probe)"),
            FetchDecision::Reuse(ReuseReason::NoLoadSignal) => write!(f, "Reuse (no load signal)"),
            FetchDecision::Reuse(ReuseReason::KnownClosed) => write!(f, "Reuse (closed)"),
            FetchDecision::Reuse(ReuseReason::OutsideDefaultWindow) => {
                write!(f, "Reuse (outside default window)")
            }
        }
    }
}

/// Entities known to carry a historical load signal.
///
/// Membership is case-insensitive and checked against the roster query, its
/// name part, and the cached record's name, so a reworded query still hits.
#[derive(Clone, Debug, Default)]
pub struct LoadSignalList {
    names: HashSet<String>,
}

impl LoadSignalList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        LoadSignalList {
            names: names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, entity: &RosterEntity, prior: Option<&CachedRecord>) -> bool {
        let hit = |s: &str| self.names.contains(&s.trim().to_lowercase());
        hit(&entity.query) || hit(entity.display_name()) || prior.is_some_and(|r| hit(&r.name))
    }
}

/// Once-daily rediscovery of entities outside the allow-list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReprobeWindow {
    /// Local hour during which dormant entities may be re-probed.
    pub hour: u32,
    /// Minimum seconds since the record's last successful lookup.
    #[serde(default = "default_reprobe_interval")]
    pub min_interval_secs: u64,
}

fn default_reprobe_interval() -> u64 {
    DEFAULT_REPROBE_INTERVAL_SECS
}

impl ReprobeWindow {
    pub fn at_hour(hour: u32) -> Self {
        ReprobeWindow {
            hour,
            min_interval_secs: DEFAULT_REPROBE_INTERVAL_SECS,
        }
    }

    fn is_due(&self, prior: &CachedRecord, moment: &Moment) -> bool {
        moment.hour() == self.hour
            && prior.fetched_at.map_or(true, |at| {
                moment.timestamp.saturating_sub(at) >= self.min_interval_secs as i64
            })
    }
}

/// Per-entity fetch policy, built from configuration.
#[derive(Clone, Debug, Default)]
pub struct FetchPolicy {
    pub load_signal: LoadSignalList,
    pub default_window: OpenWindow,
    /// Disabled by default: dormant entities stay dormant until reconfigured.
    pub reprobe: Option<ReprobeWindow>,
}

impl FetchPolicy {
    pub fn new(load_signal: LoadSignalList) -> Self {
        FetchPolicy {
            load_signal,
            ..FetchPolicy::default()
        }
    }

    pub fn with_default_window(mut self, window: OpenWindow) -> Self {
        self.default_window = window;
        self
    }

    pub fn with_reprobe(mut self, reprobe: ReprobeWindow) -> Self {
        self.reprobe = Some(reprobe);
        self
    }

    /// Decide Fetch vs. Reuse for one entity at `moment`.
    ///
    /// The prior record's open-state is re-derived here, never read from the
    /// cached `is_open` flag.
    pub fn decide(
        &self,
        prior: Option<&CachedRecord>,
        entity: &RosterEntity,
        moment: &Moment,
    ) -> FetchDecision {
        let Some(prior) = prior else {
            return FetchDecision::Fetch(FetchReason::NoPriorRecord);
        };

        if !self.load_signal.contains(entity, Some(prior)) {
            if self.reprobe.is_some_and(|r| r.is_due(prior, moment)) {
                return FetchDecision::Fetch(FetchReason::Reprobe);
            }
            return FetchDecision::Reuse(ReuseReason::NoLoadSignal);
        }

        let state = schedule::evaluate(prior.working_hours.as_ref(), moment, self.default_window);
        if state.is_known_closed() {
            return FetchDecision::Reuse(ReuseReason::KnownClosed);
        }
        if !state.hours_known && !self.default_window.contains(moment.hour()) {
            return FetchDecision::Reuse(ReuseReason::OutsideDefaultWindow);
        }

        FetchDecision::Fetch(FetchReason::LikelyOpen)
    }
}
