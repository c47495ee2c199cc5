use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::multipart::Field;
use axum::http::header::CONTENT_LENGTH;
use tokio::fs as async_fs;
use tracing::info;

use crate::error::{AppError, Result};
use super::capacity::CapacityGuard;
use super::models::StoredFile;
use super::path_guard::{sanitize_filename, ExtensionPolicy, PathGuard};
use super::writer::AdmittedWriter;

/// An inbound byte stream for an upload.
#[async_trait]
pub trait UploadSource: Send {
    /// Total length if it can be learned without consuming the stream.
    fn length_hint(&self) -> Option<u64>;

    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

#[async_trait]
impl<'a> UploadSource for Field<'a> {
    fn length_hint(&self) -> Option<u64> {
        self.headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.chunk()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Failed to read file data: {}", e)))
    }
}

/// Upload already held in memory; its length is always known.
#[derive(Debug, Clone)]
pub struct BufferedUpload {
    data: Option<Bytes>,
    len: u64,
}

impl BufferedUpload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            len: data.len() as u64,
            data: Some(data),
        }
    }
}

#[async_trait]
impl UploadSource for BufferedUpload {
    fn length_hint(&self) -> Option<u64> {
        Some(self.len)
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.data.take())
    }
}

#[derive(Clone)]
pub struct UploadGateway {
    guard: PathGuard,
    capacity: CapacityGuard,
    policy: ExtensionPolicy,
    max_bytes: u64,
}

impl UploadGateway {
    pub fn new(
        guard: PathGuard,
        capacity: CapacityGuard,
        policy: ExtensionPolicy,
        max_bytes: u64,
    ) -> Self {
        Self {
            guard,
            capacity,
            policy,
            max_bytes,
        }
    }

    /// Validate and persist an upload. An existing file with the same
    /// sanitized name is replaced.
    pub async fn accept<S: UploadSource>(
        &self,
        source: Option<S>,
        declared_name: Option<&str>,
    ) -> Result<StoredFile> {
        let mut source =
            source.ok_or_else(|| AppError::InvalidInput("No file found in request".to_string()))?;

        let declared_name = declared_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::InvalidInput("No filename provided".to_string()))?;

        let length_hint = source.length_hint();
        if let Some(len) = length_hint {
            if len > self.max_bytes {
                return Err(AppError::PayloadTooLarge { limit: self.max_bytes });
            }
        }
        self.capacity.ensure_available(length_hint)?;

        let name = sanitize_filename(declared_name);
        if name.is_empty() {
            return Err(AppError::InvalidInput(
                "Invalid filename or file type not allowed".to_string(),
            ));
        }
        self.policy.check(&name)?;

        let destination = self.guard.resolve(&name)?;
        async_fs::create_dir_all(self.guard.root()).await?;

        let mut writer =
            AdmittedWriter::create(&destination, self.capacity.clone(), Some(self.max_bytes))
                .await?;
        while let Some(chunk) = source.next_chunk().await? {
            writer.write_chunk(&chunk).await?;
        }
        let size = writer.finish().await?;

        let modified_timestamp = async_fs::metadata(&destination)
            .await?
            .modified()
            .ok()
            .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|since| since.as_secs() as i64)
            .unwrap_or_else(|| chrono::Utc::now().timestamp());

        info!("File {} uploaded ({} bytes)", name, size);

        Ok(StoredFile {
            name,
            size,
            modified_timestamp,
        })
    }
}
