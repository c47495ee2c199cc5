//! Disk-space admission control for writes into the storage directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{AppError, Result};
use super::models::StorageStats;

/// Source of live usage numbers for the volume holding a path.
pub trait SpaceProbe: Send + Sync {
    fn stats(&self, path: &Path) -> Result<StorageStats>;
}

/// Asks the filesystem holding the path directly (statvfs on unix,
/// `GetDiskFreeSpaceEx` on windows). A path that does not exist yet is
/// measured through its closest existing ancestor.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskSpaceProbe;

impl SpaceProbe for DiskSpaceProbe {
    fn stats(&self, path: &Path) -> Result<StorageStats> {
        let target = path
            .ancestors()
            .find(|candidate| !candidate.as_os_str().is_empty() && candidate.exists())
            .unwrap_or_else(|| Path::new("."));

        let fs_stats = fs2::statvfs(target).map_err(|e| {
            AppError::Internal(format!("failed to stat volume of {}: {}", target.display(), e))
        })?;

        let total = fs_stats.total_space();
        let free = fs_stats.available_space();

        debug!(path = %target.display(), total, free, "Measured storage volume");

        Ok(StorageStats {
            total,
            used: total.saturating_sub(free),
            free,
        })
    }
}

/// Advisory admission check: compares a byte count against the free space
/// observed at call time. Nothing is reserved, so concurrent writers can
/// jointly overcommit.
#[derive(Clone)]
pub struct CapacityGuard {
    root: PathBuf,
    probe: Arc<dyn SpaceProbe>,
}

impl CapacityGuard {
    pub fn new(root: impl Into<PathBuf>, probe: Arc<dyn SpaceProbe>) -> Self {
        Self {
            root: root.into(),
            probe,
        }
    }

    pub fn stats(&self) -> Result<StorageStats> {
        self.probe.stats(&self.root)
    }

    /// Unknown sizes are admitted.
    pub fn ensure_available(&self, required: Option<u64>) -> Result<()> {
        let Some(required) = required else {
            return Ok(());
        };

        let free = self.stats()?.free;
        if required > free {
            return Err(AppError::InsufficientSpace { required, free });
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Probe reporting a settable amount of free space.
    pub(crate) struct FixedSpaceProbe {
        pub total: u64,
        pub free: AtomicU64,
    }

    impl FixedSpaceProbe {
        pub(crate) fn new(total: u64, free: u64) -> Arc<Self> {
            Arc::new(Self {
                total,
                free: AtomicU64::new(free),
            })
        }
    }

    impl SpaceProbe for FixedSpaceProbe {
        fn stats(&self, _path: &Path) -> Result<StorageStats> {
            let free = self.free.load(Ordering::SeqCst);
            Ok(StorageStats {
                total: self.total,
                used: self.total - free,
                free,
            })
        }
    }

    #[test]
    fn test_rejects_when_required_exceeds_free() {
        let guard = CapacityGuard::new("/unused", FixedSpaceProbe::new(1000, 100));

        assert!(guard.ensure_available(Some(0)).is_ok());
        assert!(guard.ensure_available(Some(100)).is_ok());

        match guard.ensure_available(Some(101)) {
            Err(AppError::InsufficientSpace { required, free }) => {
                assert_eq!(required, 101);
                assert_eq!(free, 100);
            }
            other => panic!("expected InsufficientSpace, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_size_is_admitted() {
        let guard = CapacityGuard::new("/unused", FixedSpaceProbe::new(1000, 0));
        assert!(guard.ensure_available(None).is_ok());
    }

    #[test]
    fn test_reflects_live_free_space() {
        let probe = FixedSpaceProbe::new(1000, 500);
        let guard = CapacityGuard::new("/unused", probe.clone());

        assert!(guard.ensure_available(Some(400)).is_ok());
        probe.free.store(300, Ordering::SeqCst);
        assert!(guard.ensure_available(Some(400)).is_err());
        assert_eq!(guard.stats().unwrap().used, 700);
    }

    #[test]
    fn test_disk_space_measures_the_directory_itself() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let stats = DiskSpaceProbe.stats(temp_dir.path()).unwrap();

        assert_eq!(stats.total, fs2::total_space(temp_dir.path()).unwrap());
        assert!(stats.free <= stats.total);
        assert_eq!(stats.used, stats.total - stats.free);
    }

    #[test]
    fn test_disk_space_uses_closest_existing_ancestor() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let missing = temp_dir.path().join("not").join("created").join("yet");

        let stats = DiskSpaceProbe.stats(&missing).unwrap();
        assert_eq!(stats.total, fs2::total_space(temp_dir.path()).unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_disk_space_sees_memory_backed_volumes() {
        let shm = Path::new("/dev/shm");
        if !shm.is_dir() {
            return;
        }
        let Ok(temp_dir) = tempfile::TempDir::new_in(shm) else {
            return;
        };

        let stats = DiskSpaceProbe.stats(temp_dir.path()).unwrap();
        assert_eq!(stats.total, fs2::total_space(shm).unwrap());
    }
}
