//! Tracker configuration: roster, load-signal allow-list, and policy knobs.
//!
//! Loaded from a JSON file and optionally overridden from the environment:
//!
//! ```json
//! {
//!   "roster": {
//!     "placa_mercadal": ["Casa Coder, Reus", "La Presó, Reus"],
//!     "placa_del_teatre": ["Oplontina, Reus"]
//!   },
//!   "load_signal": ["Casa Coder", "La Presó"],
//!   "default_open_window": {"open_hour": 9, "close_hour": 23},
//!   "reprobe": null,
//!   "max_concurrency": 1,
//!   "snapshot_max_age_secs": 900,
//!   "cache_file": "data/restaurants_cache.json"
//! }
//! ```
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `FOOTFALL_CACHE_FILE` | `cache_file` |
//! | `FOOTFALL_MAX_CONCURRENCY` | `max_concurrency` |
//! | `FOOTFALL_SNAPSHOT_MAX_AGE_SECS` | `snapshot_max_age_secs` |

use crate::error::{Error, Result};
use crate::policy::{FetchPolicy, LoadSignalList, ReprobeWindow};
use crate::record::RosterEntity;
use crate::schedule::OpenWindow;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Snapshot age after which `refresh_if_stale` runs a forced pass.
pub const DEFAULT_SNAPSHOT_MAX_AGE_SECS: u64 = 900;

/// The fixed roster: category → entities.
///
/// Categories iterate in name order, matching the keys of a reconciled
/// result; entities keep their declaration order within a category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    categories: BTreeMap<String, Vec<RosterEntity>>,
}

impl Roster {
    pub fn new() -> Self {
        Roster::default()
    }

    /// Build from category → query strings.
    pub fn from_queries(queries: &BTreeMap<String, Vec<String>>) -> Self {
        let mut roster = Roster::new();
        for (category, list) in queries {
            for query in list {
                roster.add(category.clone(), query.clone());
            }
        }
        roster
    }

    pub fn with_entity(mut self, category: impl Into<String>, query: impl Into<String>) -> Self {
        self.add(category, query);
        self
    }

    pub fn add(&mut self, category: impl Into<String>, query: impl Into<String>) {
        let entity = RosterEntity::new(category, query);
        self.categories
            .entry(entity.category.clone())
            .or_default()
            .push(entity);
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn entities(&self, category: &str) -> &[RosterEntity] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Complete tracker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Category → roster query strings ("Name, City").
    pub roster: BTreeMap<String, Vec<String>>,
    /// Names or queries of entities known to carry a historical load signal.
    pub load_signal: Vec<String>,
    pub default_open_window: OpenWindow,
    /// Once-daily rediscovery of dormant entities; disabled when absent.
    pub reprobe: Option<ReprobeWindow>,
    /// Lookups allowed in flight at once during a forced pass.
    pub max_concurrency: usize,
    pub snapshot_max_age_secs: u64,
    pub cache_file: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            roster: BTreeMap::new(),
            load_signal: Vec::new(),
            default_open_window: OpenWindow::default(),
            reprobe: None,
            max_concurrency: 1,
            snapshot_max_age_secs: DEFAULT_SNAPSHOT_MAX_AGE_SECS,
            cache_file: PathBuf::from("data/restaurants_cache.json"),
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, apply environment overrides, and validate.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the file is unreadable or invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("cannot read {}: {}", path.display(), e)))?;
        let config: TrackerConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::ConfigError(format!("invalid {}: {}", path.display(), e)))?;
        let config = config.with_env_overrides()?;
        config.validate()?;
        info!(
            "✓ Loaded tracker config from {} ({} categories)",
            path.display(),
            config.roster.len()
        );
        Ok(config)
    }

    /// Apply `FOOTFALL_*` environment overrides.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if a variable is set but unparseable.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(path) = std::env::var_os("FOOTFALL_CACHE_FILE") {
            self.cache_file = PathBuf::from(path);
        }
        if let Some(n) = parse_env::<usize>("FOOTFALL_MAX_CONCURRENCY")? {
            self.max_concurrency = n;
        }
        if let Some(secs) = parse_env::<u64>("FOOTFALL_SNAPSHOT_MAX_AGE_SECS")? {
            self.snapshot_max_age_secs = secs;
        }
        Ok(self)
    }

    /// Check every value, reporting all problems at once.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` listing each issue.
    pub fn validate(&self) -> Result<()> {
        let mut issues: Vec<String> = Vec::new();

        if self.roster.values().all(Vec::is_empty) {
            issues.push("roster must contain at least one entity".into());
        }
        for (category, queries) in &self.roster {
            if category.trim().is_empty() {
                issues.push("roster category names must not be empty".into());
            }
            let mut seen = HashSet::new();
            for query in queries {
                if query.trim().is_empty() {
                    issues.push(format!("roster.{} contains an empty query", category));
                } else if !seen.insert(query.trim()) {
                    issues.push(format!("roster.{} lists '{}' twice", category, query));
                }
            }
        }

        let window = self.default_open_window;
        if window.open_hour >= window.close_hour || window.close_hour > 24 {
            issues.push(format!(
                "default_open_window must satisfy open_hour < close_hour <= 24, got {}-{}",
                window.open_hour, window.close_hour
            ));
        }
        if let Some(reprobe) = self.reprobe {
            if reprobe.hour > 23 {
                issues.push(format!("reprobe.hour must be 0-23, got {}", reprobe.hour));
            }
        }
        if self.max_concurrency == 0 {
            issues.push("max_concurrency must be > 0".into());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigError(issues.join("; ")))
        }
    }

    pub fn roster(&self) -> Roster {
        Roster::from_queries(&self.roster)
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        let mut policy = FetchPolicy::new(LoadSignalList::new(&self.load_signal))
            .with_default_window(self.default_open_window);
        if let Some(reprobe) = self.reprobe {
            policy = policy.with_reprobe(reprobe);
        }
        policy
    }

    pub fn snapshot_max_age(&self) -> Duration {
        Duration::from_secs(self.snapshot_max_age_secs)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::ConfigError(format!("{} is not a valid value: '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "roster": {
            "placa_mercadal": ["Casa Coder, Reus", "La Presó, Reus"],
            "placa_del_teatre": ["Oplontina, Reus"]
        },
        "load_signal": ["Casa Coder"],
        "reprobe": {"hour": 12}
    }"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = TrackerConfig::from_json_str(SAMPLE).expect("valid config");

        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.snapshot_max_age(), Duration::from_secs(900));
        assert_eq!(config.default_open_window, OpenWindow::default());
        assert_eq!(
            config.reprobe,
            Some(ReprobeWindow::at_hour(12))
        );

        let roster = config.roster();
        assert_eq!(roster.len(), 3);
        assert_eq!(
            roster.categories().collect::<Vec<_>>(),
            vec!["placa_del_teatre", "placa_mercadal"]
        );
        assert_eq!(roster.entities("placa_mercadal")[1].query, "La Presó, Reus");
        assert!(roster.entities("unknown").is_empty());
    }

    #[test]
    fn test_fetch_policy_from_config() {
        let config = TrackerConfig::from_json_str(SAMPLE).expect("valid config");
        let policy = config.fetch_policy();
        assert_eq!(policy.load_signal.len(), 1);
        assert!(policy.reprobe.is_some());
    }

    #[test]
    fn test_validate_collects_issues() {
        let config = TrackerConfig {
            default_open_window: OpenWindow {
                open_hour: 23,
                close_hour: 9,
            },
            max_concurrency: 0,
            ..TrackerConfig::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("roster must contain at least one entity"));
        assert!(err.contains("default_open_window"));
        assert!(err.contains("max_concurrency"));
    }

    #[test]
    fn test_validate_duplicate_query() {
        let err = TrackerConfig::from_json_str(r#"{"roster": {"plaza": ["A, City", "A, City"]}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn test_from_file_reads_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tracker.json");
        std::fs::write(&path, SAMPLE).expect("write config");

        let config = TrackerConfig::from_file(&path).expect("config loads");
        assert_eq!(config.load_signal, vec!["Casa Coder".to_string()]);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            TrackerConfig::from_json_str("{roster"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_roster_orders_categories_by_name() {
        let roster = Roster::new()
            .with_entity("zona_nord", "Z2, City")
            .with_entity("zona_nord", "Z1, City")
            .with_entity("centre", "C, City");

        assert_eq!(
            roster.categories().collect::<Vec<_>>(),
            vec!["centre", "zona_nord"]
        );
        let queries: Vec<&str> = roster
            .entities("zona_nord")
            .iter()
            .map(|e| e.query.as_str())
            .collect();
        assert_eq!(queries, vec!["Z2, City", "Z1, City"]);
    }

    #[test]
    fn test_roster_builder() {
        let roster = Roster::new()
            .with_entity("plaza", "A, City")
            .with_entity("plaza", "B, City");
        assert!(roster.contains("plaza"));
        assert_eq!(roster.entities("plaza")[0].display_name(), "A");
        assert!(!roster.is_empty());
    }
}
