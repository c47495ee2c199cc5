use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use tokio::fs as async_fs;

use crate::error::Result;
use super::capacity::CapacityGuard;
use super::models::{StorageStats, StoredFile};

/// Directory listing and volume usage, re-derived from the filesystem on every call.
#[derive(Clone)]
pub struct StorageCatalog {
    root: PathBuf,
    capacity: CapacityGuard,
}

impl StorageCatalog {
    pub fn new(root: impl Into<PathBuf>, capacity: CapacityGuard) -> Self {
        Self {
            root: root.into(),
            capacity,
        }
    }

    pub async fn ensure_root(&self) -> Result<()> {
        async_fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Regular files directly inside the storage directory, sorted by name.
    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        self.ensure_root().await?;

        let mut files = Vec::new();
        let mut dir = async_fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!("Skipping non UTF-8 file name in {}", self.root.display());
                continue;
            };

            let metadata = entry.metadata().await?;
            let modified_timestamp = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|since| since.as_secs() as i64)
                .unwrap_or(0);

            files.push(StoredFile {
                name,
                size: metadata.len(),
                modified_timestamp,
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    pub async fn stats(&self) -> Result<StorageStats> {
        self.ensure_root().await?;
        self.capacity.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::capacity::tests::FixedSpaceProbe;
    use tempfile::TempDir;

    fn catalog(root: PathBuf) -> StorageCatalog {
        let capacity = CapacityGuard::new(root.clone(), FixedSpaceProbe::new(4096, 1024));
        StorageCatalog::new(root, capacity)
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_flat() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        std::fs::write(root.join("b.txt"), b"bb").unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::create_dir(root.join("nested")).unwrap();
        std::fs::write(root.join("nested").join("hidden.txt"), b"hidden").unwrap();

        let files = catalog(root).list().await.unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(files[0].size, 1);
        assert_eq!(files[1].size, 2);
        assert!(files[0].modified_timestamp > 0);
    }

    #[tokio::test]
    async fn test_list_creates_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("transfer");

        let files = catalog(root.clone()).list().await.unwrap();
        assert!(files.is_empty());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_stats_creates_root_and_reports_probe() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("fresh");

        let stats = catalog(root.clone()).stats().await.unwrap();
        assert!(root.is_dir());
        assert_eq!(stats, StorageStats { total: 4096, used: 3072, free: 1024 });
    }
}
