//! In-memory snapshot store (tests and single-process deployments).
//!
//! Keeps the encoded JSON rather than the struct so reads go through the same
//! decode path as the durable stores.

use super::{decode, encode, SnapshotStore};
use crate::error::{Error, Result};
use crate::record::Snapshot;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Thread-safe async in-memory snapshot store.
///
/// Clones share the same slot, so a test can keep a handle after giving the
/// store to a reconciler.
///
/// # Example
///
/// ```no_run
/// use footfall::store::{InMemoryStore, SnapshotStore};
/// use footfall::record::Snapshot;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///     store.save(&Snapshot::default()).await?;
///     assert!(store.load().await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStore {
    slot: Arc<RwLock<Option<Vec<u8>>>>,
    saves: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    /// Store pre-seeded with `snapshot`.
    ///
    /// # Errors
    /// Returns `Err` if the snapshot cannot be encoded.
    pub fn with_snapshot(snapshot: &Snapshot) -> Result<Self> {
        let store = InMemoryStore::new();
        store.seed(encode(snapshot)?);
        Ok(store)
    }

    /// Replace the raw stored bytes, bypassing encoding.
    pub fn seed(&self, bytes: Vec<u8>) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every subsequent save fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl SnapshotStore for InMemoryStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        match slot.as_deref() {
            Some(bytes) => {
                debug!("✓ InMemory LOAD ({} bytes)", bytes.len());
                decode(bytes).map(Some)
            }
            None => {
                debug!("✓ InMemory LOAD -> empty");
                Ok(None)
            }
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StoreError("in-memory store is read-only".to_string()));
        }

        let bytes = encode(snapshot)?;
        debug!("✓ InMemory SAVE ({} bytes)", bytes.len());
        self.seed(bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
        warn!("⚠ InMemory CLEAR executed - snapshot dropped!");
        Ok(())
    }
}
