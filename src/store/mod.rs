//! Snapshot store implementations.
//!
//! The whole roster is persisted as one JSON document:
//!
//! ```text
//! { "timestamp": <epoch-seconds>, "data": { "<category>": [ <record>, ... ] } }
//! ```
//!
//! Read wholesale on every request, written wholesale once per forced refresh,
//! so a reader never observes a half-updated roster.

use crate::error::Result;
use crate::record::Snapshot;

#[cfg(feature = "file")]
pub mod file;
pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "file")]
pub use file::FileStore;
pub use inmemory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis::{RedisStore, RedisStoreConfig};

/// Trait for snapshot store implementations.
///
/// All methods take `&self`; implementations use interior mutability or
/// external storage.
#[allow(async_fn_in_trait)]
pub trait SnapshotStore: Send + Sync {
    /// Load the last persisted snapshot.
    ///
    /// # Returns
    /// - `Ok(Some(snapshot))` - A snapshot was persisted before
    /// - `Ok(None)` - Nothing persisted yet
    ///
    /// # Errors
    /// Returns `Err` if the store is unreachable or the snapshot is corrupt.
    async fn load(&self) -> Result<Option<Snapshot>>;

    /// Replace the persisted snapshot in one write.
    ///
    /// # Errors
    /// Returns `Err` if the write fails.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Health check - verify the store is accessible.
    ///
    /// # Errors
    /// Returns `Err` if the store is not accessible
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Optional: Remove the persisted snapshot.
    ///
    /// # Errors
    /// Returns `Err` if the operation is not implemented or fails
    async fn clear(&self) -> Result<()> {
        Err(crate::error::Error::NotImplemented(
            "clear not implemented for this store".to_string(),
        ))
    }
}

/// Encode a snapshot in its persisted JSON form.
///
/// # Errors
/// Returns `Error::SerializationError` if encoding fails.
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(snapshot)?)
}

/// Decode a persisted snapshot.
///
/// # Errors
/// Returns `Error::DeserializationError` for malformed JSON.
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    Ok(serde_json::from_slice(bytes)?)
}
