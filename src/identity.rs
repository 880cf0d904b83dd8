//! Fuzzy identity matching between roster queries and cached records.
//!
//! A record's identity is not its query string: rosters get reworded between
//! deployments ("La Presó, Reus" → "La Preso, Reus") and the provider returns
//! cosmetically different names. Matching runs in three passes over the whole
//! index, first accepted match wins:
//!
//! 1. exact name equality
//! 2. case-insensitive substring containment, either direction
//! 3. position-wise character overlap above [`OVERLAP_THRESHOLD`]

use crate::record::{CachedRecord, Snapshot};

/// Minimum share of equal characters, relative to the shorter string.
pub const OVERLAP_THRESHOLD: f64 = 0.6;

/// How a query was matched to a cached record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MatchKind {
    Exact,
    Containment,
    Overlap(f64),
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKind::Exact => write!(f, "exact"),
            MatchKind::Containment => write!(f, "containment"),
            MatchKind::Overlap(ratio) => write!(f, "overlap {:.2}", ratio),
        }
    }
}

/// Previously cached records indexed by name, in snapshot order.
#[derive(Clone, Debug, Default)]
pub struct NameIndex {
    entries: Vec<(String, CachedRecord)>,
}

impl NameIndex {
    pub fn new() -> Self {
        NameIndex::default()
    }

    /// Flatten every category of a snapshot. A name seen twice keeps its
    /// first occurrence.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut index = NameIndex::new();
        for record in snapshot.records() {
            index.insert(record.clone());
        }
        index
    }

    pub fn insert(&mut self, record: CachedRecord) {
        if self.entries.iter().any(|(name, _)| *name == record.name) {
            return;
        }
        self.entries.push((record.name.clone(), record));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the record a roster query most plausibly refers to.
    pub fn resolve(&self, query: &str) -> Option<(&CachedRecord, MatchKind)> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        if let Some((_, record)) = self.entries.iter().find(|(name, _)| name == query) {
            return Some((record, MatchKind::Exact));
        }

        let lowered = query.to_lowercase();
        let candidates = || {
            self.entries
                .iter()
                .filter(|(name, _)| !name.trim().is_empty())
                .map(|(name, record)| (name.to_lowercase(), record))
        };

        if let Some((_, record)) = candidates()
            .find(|(name, _)| lowered.contains(name.as_str()) || name.contains(lowered.as_str()))
        {
            return Some((record, MatchKind::Containment));
        }

        candidates().find_map(|(name, record)| {
            let ratio = overlap_ratio(&lowered, &name);
            (ratio > OVERLAP_THRESHOLD).then_some((record, MatchKind::Overlap(ratio)))
        })
    }
}

/// Share of positions where the shorter string agrees with the longer one.
///
/// Compares characters, not bytes, so accented letters count once.
pub fn overlap_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if shorter.is_empty() {
        return 0.0;
    }

    let matches = shorter
        .iter()
        .zip(longer.iter())
        .filter(|(x, y)| x == y)
        .count();

    matches as f64 / shorter.len() as f64
}
