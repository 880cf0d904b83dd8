//! Lookup collaborator: the paid third-party place-details API.
//!
//! The HTTP client lives outside this crate. It plugs in through
//! [`PlaceLookup`], and [`PlaceDetails::from_search_response`] decodes the
//! provider's maps-search payload for it.
//!
//! # Implementing PlaceLookup
//!
//! Return:
//! - `Ok(Some(place))` when the provider found the entity
//! - `Ok(None)` when it answered but found nothing
//! - `Err(Error::LookupError(..))` for network, auth, or decode failures
//!
//! Both of the last two degrade to the prior or default record for that
//! entity only; neither aborts a refresh.
//!
//! # Mocking for Tests
//!
//! [`InMemoryLookup`] answers from a scripted table and counts calls per
//! query, which is how the tests prove a lookup was (or was not) spent.

use crate::error::{Error, Result};
use crate::record::{DayHistogram, WorkingHours};
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Place details as returned by the lookup provider. Every field is optional;
/// partial answers are normal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, alias = "workingHours", deserialize_with = "lenient_hours")]
    pub working_hours: Option<WorkingHours>,

    #[serde(default, alias = "popularTimes", deserialize_with = "lenient_histogram")]
    pub popular_times: Option<Vec<DayHistogram>>,

    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default, alias = "reviewCount")]
    pub reviews: Option<u64>,
}

impl PlaceDetails {
    pub fn named(name: impl Into<String>) -> Self {
        PlaceDetails {
            name: Some(name.into()),
            ..PlaceDetails::default()
        }
    }

    /// Extract the first place of a maps-search response.
    ///
    /// Accepts `{"data": [[place, ...]]}`, a bare `[[place, ...]]`, and the
    /// flattened `[place, ...]` form.
    ///
    /// # Errors
    /// Returns `Error::ValidationError` if the response carries no place list,
    /// or `Error::DeserializationError` if the first place is malformed.
    pub fn from_search_response(response: &serde_json::Value) -> Result<Option<Self>> {
        let data = response.get("data").unwrap_or(response);
        if !data.is_array() {
            return Err(Error::ValidationError(format!(
                "search response has no place list: {}",
                response
            )));
        }
        let place = match data.get(0) {
            Some(serde_json::Value::Array(places)) => places.first(),
            Some(place @ serde_json::Value::Object(_)) => Some(place),
            _ => None,
        };

        match place {
            Some(place) => Ok(Some(PlaceDetails::deserialize(place)?)),
            None => Ok(None),
        }
    }
}

/// Providers send either one interval string or a list per weekday.
fn lenient_hours<'de, D>(deserializer: D) -> std::result::Result<Option<WorkingHours>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Slots {
        One(String),
        Many(Vec<String>),
    }

    let raw: Option<BTreeMap<String, Slots>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|days| {
        days.into_iter()
            .map(|(day, slots)| match slots {
                Slots::One(slot) => (day, slot.split(',').map(|s| s.trim().to_string()).collect()),
                Slots::Many(slots) => (day, slots),
            })
            .collect()
    }))
}

/// Histogram days that do not decode (e.g. a "live" pseudo-day) are dropped.
fn lenient_histogram<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<DayHistogram>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|days| {
        days.into_iter()
            .filter_map(|day| serde_json::from_value::<DayHistogram>(day).ok())
            .collect()
    }))
}

/// Trait for lookup provider implementations.
#[allow(async_fn_in_trait)]
pub trait PlaceLookup: Send + Sync {
    /// Look up one roster query.
    ///
    /// # Errors
    /// Returns `Err` if the provider is unavailable or its answer is unusable.
    async fn lookup(&self, query: &str) -> Result<Option<PlaceDetails>>;
}

// ============================================================================
// In-Memory Test Lookup
// ============================================================================

#[derive(Clone, Debug)]
enum Scripted {
    Found(PlaceDetails),
    Fail(String),
}

/// Scripted lookup for tests and offline runs.
///
/// Clones share the same script and counters.
#[derive(Clone, Default)]
pub struct InMemoryLookup {
    answers: Arc<DashMap<String, Scripted>>,
    calls: Arc<DashMap<String, usize>>,
}

impl InMemoryLookup {
    pub fn new() -> Self {
        InMemoryLookup::default()
    }

    /// Answer `query` with `place` from now on.
    pub fn insert(&self, query: impl Into<String>, place: PlaceDetails) {
        self.answers.insert(query.into(), Scripted::Found(place));
    }

    /// Fail every lookup of `query` from now on.
    pub fn fail(&self, query: impl Into<String>, message: impl Into<String>) {
        self.answers
            .insert(query.into(), Scripted::Fail(message.into()));
    }

    /// Forget the scripted answer; the query then finds nothing.
    pub fn remove(&self, query: &str) {
        self.answers.remove(query);
    }

    /// Number of lookups made for `query`.
    pub fn calls(&self, query: &str) -> usize {
        self.calls.get(query).map(|c| *c).unwrap_or(0)
    }

    /// Number of lookups made for any query.
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }
}

impl PlaceLookup for InMemoryLookup {
    async fn lookup(&self, query: &str) -> Result<Option<PlaceDetails>> {
        *self.calls.entry(query.to_string()).or_insert(0) += 1;

        let answer = self.answers.get(query).map(|a| a.value().clone());
        match answer {
            Some(Scripted::Found(place)) => Ok(Some(place)),
            Some(Scripted::Fail(message)) => Err(Error::LookupError(message)),
            None => Ok(None),
        }
    }
}
