use std::path::PathBuf;

use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{AppError, Result};
use super::capacity::CapacityGuard;

/// Streams chunks into a destination file, re-running capacity admission
/// before every chunk.
///
/// Unless [`AdmittedWriter::finish`] succeeds, the destination is removed on
/// drop. This covers early returns through `?` as well as a dropped request
/// future.
pub struct AdmittedWriter {
    path: PathBuf,
    file: Option<async_fs::File>,
    capacity: CapacityGuard,
    max_bytes: Option<u64>,
    written: u64,
    committed: bool,
}

impl AdmittedWriter {
    /// Creates (or truncates) the destination.
    pub async fn create(
        path: impl Into<PathBuf>,
        capacity: CapacityGuard,
        max_bytes: Option<u64>,
    ) -> Result<Self> {
        let path = path.into();
        let file = async_fs::File::create(&path).await?;

        Ok(Self {
            path,
            file: Some(file),
            capacity,
            max_bytes,
            written: 0,
            committed: false,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        let next = self.written + chunk.len() as u64;

        if let Some(limit) = self.max_bytes {
            if next > limit {
                return Err(AppError::PayloadTooLarge { limit });
            }
        }

        self.capacity.ensure_available(Some(next))?;

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| AppError::Internal("write after finish".to_string()))?;
        file.write_all(chunk).await?;

        self.written = next;
        Ok(())
    }

    /// Flush to disk and keep the file. Returns the number of bytes written.
    pub async fn finish(mut self) -> Result<u64> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        self.committed = true;
        Ok(self.written)
    }
}

impl Drop for AdmittedWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        drop(self.file.take());

        match std::fs::remove_file(&self.path) {
            Ok(()) => warn!("Removed partial file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial file {}: {}", self.path.display(), e),
        }
    }
}
