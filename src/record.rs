//! Data model: roster entities, cached records, and the persisted snapshot.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Weekday name ("Monday") → ordered list of interval strings ("12PM-12AM").
pub type WorkingHours = BTreeMap<String, Vec<String>>;

/// Category → ordered sequence of records, the shape returned to callers.
pub type CategoryData = BTreeMap<String, Vec<CachedRecord>>;

/// One cell of a weekly popularity histogram.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourLoad {
    pub hour: u32,
    pub percentage: u32,
}

/// One weekday of a weekly popularity histogram.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHistogram {
    /// ISO weekday, 1 = Monday .. 7 = Sunday.
    pub day: u32,
    #[serde(default)]
    pub popular_times: Vec<HourLoad>,
}

/// A roster member as declared by configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RosterEntity {
    pub category: String,
    /// Human-readable lookup key, e.g. "Name, City".
    pub query: String,
}

impl RosterEntity {
    pub fn new(category: impl Into<String>, query: impl Into<String>) -> Self {
        RosterEntity {
            category: category.into(),
            query: query.into(),
        }
    }

    /// Name part of the query, everything before the first comma.
    pub fn display_name(&self) -> &str {
        self.query.split(',').next().unwrap_or_default().trim()
    }
}

/// One entity's last-known state.
///
/// `is_open`, `hours_known` and `busyness` are derived from the schedule and
/// histogram at read time; the stored values are never trusted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busyness: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<u64>,

    #[serde(default = "default_open")]
    pub is_open: bool,

    #[serde(default)]
    pub hours_known: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_hours: Option<WorkingHours>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popular_times: Option<Vec<DayHistogram>>,

    /// Epoch seconds of the last successful lookup for this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<i64>,
}

fn default_open() -> bool {
    true
}

impl CachedRecord {
    /// A bare record with nothing known but its name.
    pub fn named(name: impl Into<String>) -> Self {
        CachedRecord {
            name: name.into(),
            busyness: None,
            rating: None,
            reviews: None,
            is_open: true,
            hours_known: false,
            working_hours: None,
            popular_times: None,
            fetched_at: None,
        }
    }
}

/// The unit of persistence: every category's records plus the time of the
/// pass that produced them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(deserialize_with = "epoch_seconds")]
    pub timestamp: i64,
    #[serde(default)]
    pub data: CategoryData,
}

impl Snapshot {
    pub fn new(timestamp: i64, data: CategoryData) -> Self {
        Snapshot { timestamp, data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Seconds elapsed since the snapshot was written, never negative.
    pub fn age_secs(&self, now: i64) -> u64 {
        now.saturating_sub(self.timestamp).max(0) as u64
    }

    /// Every record across categories, in category order.
    pub fn records(&self) -> impl Iterator<Item = &CachedRecord> {
        self.data.values().flatten()
    }

    /// Total number of records across categories.
    pub fn len(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }
}

/// Older snapshot files carry fractional epoch seconds.
fn epoch_seconds<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Epoch {
        Whole(i64),
        Fractional(f64),
    }

    Ok(match Epoch::deserialize(deserializer)? {
        Epoch::Whole(secs) => secs,
        Epoch::Fractional(secs) => secs.trunc() as i64,
    })
}
