use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// A regular file inside the storage directory, as observed at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub modified_timestamp: i64,
}

impl StoredFile {
    pub fn size_formatted(&self) -> String {
        format_size(self.size)
    }

    /// Local wall-clock time without offset, e.g. `2024-05-01T13:37:00`.
    pub fn modified_iso(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.modified_timestamp, 0)
            .unwrap_or_default()
            .with_timezone(&Local)
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }
}

/// Usage of the volume holding the storage directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStatsResponse {
    pub total: u64,
    pub total_formatted: String,
    pub used: u64,
    pub used_formatted: String,
    pub free: u64,
    pub free_formatted: String,
}

impl From<StorageStats> for StorageStatsResponse {
    fn from(stats: StorageStats) -> Self {
        Self {
            total: stats.total,
            total_formatted: format_size(stats.total),
            used: stats.used,
            used_formatted: format_size(stats.used),
            free: stats.free,
            free_formatted: format_size(stats.free),
        }
    }
}

pub fn format_size(num_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    if num_bytes >= MB {
        format!("{:.1} MB", num_bytes as f64 / MB as f64)
    } else if num_bytes >= KB {
        format!("{:.1} KB", num_bytes as f64 / KB as f64)
    } else {
        format!("{} B", num_bytes)
    }
}
