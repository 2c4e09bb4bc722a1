//! Where the "last known server timestamp" of a destination lives.
//!
//! By default the destination file's own modification time is the record:
//! there is no side database or sidecar file. [`MemoryFreshnessStore`] keeps
//! the same contract in a map so the policy can be exercised without touching
//! file metadata.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::DownloadError;

/// Reads and writes the freshness timestamp recorded for a destination path.
///
/// `read` returning `None` means "no local copy"; the policy then downloads
/// unconditionally.
#[async_trait]
pub trait FreshnessStore: Send + Sync + std::fmt::Debug {
    /// Returns the recorded timestamp, or `None` when the destination is absent.
    async fn read(&self, path: &Path) -> Option<SystemTime>;

    /// Records `at` as the destination's timestamp.
    async fn write(&self, path: &Path, at: SystemTime) -> Result<(), DownloadError>;
}

/// Filesystem adapter: the timestamp is the file's mtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMtimeStore;

#[async_trait]
impl FreshnessStore for FileMtimeStore {
    async fn read(&self, path: &Path) -> Option<SystemTime> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        if !metadata.is_file() {
            return None;
        }
        metadata.modified().ok()
    }

    async fn write(&self, path: &Path, at: SystemTime) -> Result<(), DownloadError> {
        let owned = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            std::fs::File::options()
                .write(true)
                .open(&owned)
                .and_then(|file| file.set_modified(at))
        })
        .await
        .map_err(|join| DownloadError::io(path, std::io::Error::other(join)))?;

        result.map_err(|source| DownloadError::io(path, source))?;
        debug!(path = %path.display(), "stamped modification time");
        Ok(())
    }
}

/// In-memory adapter keyed by path.
#[derive(Debug, Default)]
pub struct MemoryFreshnessStore {
    entries: DashMap<PathBuf, SystemTime>,
}

impl MemoryFreshnessStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the entry for `path`, as if the local copy had been deleted.
    pub fn remove(&self, path: &Path) {
        self.entries.remove(path);
    }
}

#[async_trait]
impl FreshnessStore for MemoryFreshnessStore {
    async fn read(&self, path: &Path) -> Option<SystemTime> {
        self.entries.get(path).map(|entry| *entry.value())
    }

    async fn write(&self, path: &Path, at: SystemTime) -> Result<(), DownloadError> {
        self.entries.insert(path.to_path_buf(), at);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trips_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rank.xml");
        std::fs::write(&path, b"<rank/>").unwrap();

        let stamp = UNIX_EPOCH + Duration::from_secs(1_698_391_485);
        FileMtimeStore.write(&path, stamp).await.unwrap();

        assert_eq!(FileMtimeStore.read(&path).await, Some(stamp));
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), stamp);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            FileMtimeStore.read(&temp_dir.path().join("absent.zip")).await,
            None
        );
    }

    #[tokio::test]
    async fn test_file_store_directory_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(FileMtimeStore.read(temp_dir.path()).await, None);
    }

    #[tokio::test]
    async fn test_file_store_write_to_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.zip");
        let result = FileMtimeStore.write(&path, UNIX_EPOCH).await;
        assert!(matches!(result, Err(DownloadError::Io { .. })));
    }

    #[tokio::test]
    async fn test_memory_store_tracks_entries() {
        let store = MemoryFreshnessStore::new();
        let path = Path::new("/virtual/dwca.zip");
        assert_eq!(store.read(path).await, None);

        let stamp = UNIX_EPOCH + Duration::from_secs(42);
        store.write(path, stamp).await.unwrap();
        assert_eq!(store.read(path).await, Some(stamp));

        store.remove(path);
        assert_eq!(store.read(path).await, None);
    }
}
