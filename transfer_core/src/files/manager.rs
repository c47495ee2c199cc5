use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs as async_fs;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use super::capacity::{CapacityGuard, DiskSpaceProbe, SpaceProbe};
use super::catalog::StorageCatalog;
use super::models::{StorageStats, StoredFile};
use super::path_guard::{ExtensionPolicy, PathGuard};
use super::remote::{RemoteFetcher, RemoteFetcherConfig};
use super::slugs::{SlugRegistry, DEFAULT_SLUG_LENGTH};
use super::upload::{UploadGateway, UploadSource};

#[derive(Debug, Clone)]
pub struct FileManagerConfig {
    pub storage_path: PathBuf,
    pub slug_file: PathBuf,
    pub slugs_enabled: bool,
    pub slug_length: usize,
    pub allowed_extensions: Vec<String>,
    pub enforce_allowlist: bool,
    pub max_upload_bytes: u64,
    pub remote: RemoteFetcherConfig,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FileManagerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            storage_path: config.storage.upload_dir.clone(),
            slug_file: config.storage.slug_file.clone(),
            slugs_enabled: config.slugs.enabled,
            slug_length: config.slugs.length,
            allowed_extensions: config.storage.allowed_extensions.clone(),
            enforce_allowlist: config.storage.enforce_allowlist,
            max_upload_bytes: config.storage.max_upload_bytes(),
            remote: RemoteFetcherConfig {
                user_agent: config.remote.user_agent.clone(),
                timeout: Duration::from_secs(config.remote.timeout_seconds),
                chunk_size: config.remote.chunk_size,
                max_bytes: config.remote.max_download_bytes(),
                max_redirects: config.remote.max_redirects,
            },
        }
    }
}

/// Entry point for every operation on the storage directory.
#[derive(Clone)]
pub struct FileManager {
    guard: PathGuard,
    catalog: StorageCatalog,
    slugs: Option<SlugRegistry>,
    uploads: UploadGateway,
    fetcher: RemoteFetcher,
}

impl FileManager {
    pub fn new(config: FileManagerConfig) -> Result<Self> {
        Self::with_probe(config, Arc::new(DiskSpaceProbe))
    }

    pub fn with_probe(config: FileManagerConfig, probe: Arc<dyn SpaceProbe>) -> Result<Self> {
        let guard = PathGuard::new(&config.storage_path);
        let capacity = CapacityGuard::new(&config.storage_path, probe);
        let policy = ExtensionPolicy::new(&config.allowed_extensions, config.enforce_allowlist);

        let catalog = StorageCatalog::new(&config.storage_path, capacity.clone());
        let uploads = UploadGateway::new(
            guard.clone(),
            capacity.clone(),
            policy.clone(),
            config.max_upload_bytes,
        );
        let fetcher = RemoteFetcher::new(config.remote.clone(), guard.clone(), capacity, policy)?;

        let slugs = config.slugs_enabled.then(|| {
            let length = if config.slug_length == 0 {
                DEFAULT_SLUG_LENGTH
            } else {
                config.slug_length
            };
            SlugRegistry::new(&config.slug_file, length)
        });

        Ok(Self {
            guard,
            catalog,
            slugs,
            uploads,
            fetcher,
        })
    }

    pub async fn initialize(&self) -> Result<()> {
        self.catalog.ensure_root().await
    }

    pub fn slugs(&self) -> Option<&SlugRegistry> {
        self.slugs.as_ref()
    }

    pub async fn list_files(&self) -> Result<Vec<StoredFile>> {
        self.catalog.list().await
    }

    pub async fn storage_stats(&self) -> Result<StorageStats> {
        self.catalog.stats().await
    }

    pub async fn store_upload<S: UploadSource>(
        &self,
        source: Option<S>,
        declared_name: Option<&str>,
    ) -> Result<StoredFile> {
        self.uploads.accept(source, declared_name).await
    }

    pub async fn fetch_remote(&self, url: &str) -> Result<StoredFile> {
        self.fetcher.fetch(url).await
    }

    /// Resolve a requested name to an existing regular file.
    pub async fn locate(&self, raw: &str) -> Result<PathBuf> {
        let path = self.guard.resolve(raw)?;

        match async_fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            Ok(_) => Err(AppError::NotFound("File not found".to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("File not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a stored file and drop any slugs pointing at it. Returns the
    /// removed file's name.
    pub async fn delete_file(&self, raw: &str) -> Result<String> {
        let path = self.locate(raw).await?;

        match async_fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound("File not found".to_string()));
            }
            Err(e) => {
                tracing::error!("Failed to delete file {}: {}", path.display(), e);
                return Err(AppError::Internal("failed to delete file".to_string()));
            }
        }

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw.to_string());

        if let Some(slugs) = &self.slugs {
            if let Err(e) = slugs.delete_by_filename(&name) {
                warn!("File {} deleted but its short links could not be removed: {}", name, e);
            }
        }

        info!("File {} deleted", name);
        Ok(name)
    }

    pub fn short_code(&self, filename: &str) -> Option<Result<String>> {
        self.slugs.as_ref().map(|slugs| slugs.get_or_create(filename))
    }

    /// Follow a short link to an existing file.
    pub async fn resolve_slug(&self, slug: &str) -> Result<PathBuf> {
        let slugs = self
            .slugs
            .as_ref()
            .ok_or_else(|| AppError::NotFound("Short links are disabled".to_string()))?;

        let filename = slugs
            .resolve(slug)?
            .ok_or_else(|| AppError::NotFound("Unknown short link".to_string()))?;

        self.locate(&filename).await
    }
}
