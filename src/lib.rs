//! # footfall
//!
//! An adaptive refresh cache for the live busyness of a fixed roster of venues,
//! sitting in front of a paid per-call place lookup API.
//!
//! ## Features
//!
//! - **Budget aware:** A lookup is spent only on entities that carry a load
//!   signal and are plausibly open right now
//! - **Always current:** Open-state and busyness are re-derived at read time
//!   from the cached schedule and weekly histogram, never served stale
//! - **Graceful degradation:** Failed lookups fall back to the prior record,
//!   then to an optimistic default; one bad entity never fails a pass
//! - **Store agnostic:** JSON file, in-memory, and Redis snapshot stores
//! - **Production ready:** Built-in logging, metrics hooks, and error handling
//!
//! ## Quick Start
//!
//! ```ignore
//! use footfall::{BusynessService, Reconciler, TrackerConfig};
//! use footfall::store::FileStore;
//!
//! // 1. Load the roster and policy knobs
//! let config = TrackerConfig::from_file("tracker.json")?;
//!
//! // 2. Plug in a store and your lookup provider (implements `PlaceLookup`)
//! let reconciler = Reconciler::from_config(&config, FileStore::new(&config.cache_file), lookup);
//!
//! // 3. Share the service - it is Clone
//! let service = BusynessService::new(reconciler);
//!
//! // Request path: never spends a lookup once a snapshot exists
//! let (data, timestamp) = service.fetch(None).await?;
//!
//! // Scheduler: forced pass when the snapshot is older than 15 minutes
//! service.refresh_if_stale(config.snapshot_max_age()).await?;
//! ```
//!
//! ## Lower-level pieces
//!
//! The evaluators are plain functions and can be used on their own:
//! [`schedule::evaluate`], [`busyness::current_load`],
//! [`FetchPolicy::decide`], and [`NameIndex::resolve`].

#[macro_use]
extern crate log;

pub mod busyness;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod lookup;
pub mod observability;
pub mod policy;
pub mod reconcile;
pub mod record;
pub mod schedule;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use clock::{Clock, FixedClock, Moment, SystemClock};
pub use config::{Roster, TrackerConfig};
pub use error::{Error, Result};
pub use identity::{MatchKind, NameIndex};
pub use lookup::{PlaceDetails, PlaceLookup};
pub use observability::{RefreshMetrics, RefreshReport};
pub use policy::{FetchDecision, FetchPolicy, LoadSignalList, ReprobeWindow};
pub use reconcile::{Reconciled, Reconciler};
pub use record::{CachedRecord, CategoryData, RosterEntity, Snapshot};
pub use schedule::{OpenState, OpenWindow};
pub use service::BusynessService;
pub use store::SnapshotStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
