//! JSON file snapshot store.

use super::{decode, encode, SnapshotStore};
use crate::error::{Error, Result};
use crate::record::Snapshot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Default snapshot location, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "data/restaurants_cache.json";

/// Snapshot store backed by one JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous snapshot intact.
///
/// # Example
///
/// ```no_run
/// use footfall::store::{FileStore, SnapshotStore};
///
/// # async fn example() -> footfall::Result<()> {
/// let store = FileStore::new("data/restaurants_cache.json");
/// let snapshot = store.load().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for FileStore {
    fn default() -> Self {
        FileStore::new(DEFAULT_CACHE_FILE)
    }
}

impl SnapshotStore for FileStore {
    async fn load(&self) -> Result<Option<Snapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                debug!("✓ File LOAD {} ({} bytes)", self.path.display(), bytes.len());
                decode(&bytes).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("✓ File LOAD {} -> missing", self.path.display());
                Ok(None)
            }
            Err(e) => Err(Error::StoreError(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = encode(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::StoreError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await.map_err(|e| {
            Error::StoreError(format!("Failed to write {}: {}", temp.display(), e))
        })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            Error::StoreError(format!(
                "Failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("✓ File SAVE {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => Ok(tokio::fs::metadata(parent)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)),
            None => Ok(true),
        }
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                warn!("⚠ File CLEAR {} - snapshot removed!", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
