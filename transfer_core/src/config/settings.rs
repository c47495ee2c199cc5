use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const MEGABYTE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub slugs: SlugConfig,
    pub remote: RemoteConfig,
    pub frontend: FrontendConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub slug_file: PathBuf,
    pub max_upload_mb: u64,
    pub allowed_extensions: Vec<String>,
    pub enforce_allowlist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlugConfig {
    pub enabled: bool,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub chunk_size: usize,
    pub max_download_mb: u64,
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub static_dir: PathBuf,
    pub index_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Empty means any origin is accepted.
    pub allowed_origins: Vec<String>,
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_requests: bool,
    pub log_latency: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            slugs: SlugConfig::default(),
            remote: RemoteConfig::default(),
            frontend: FrontendConfig::default(),
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8089,
            request_timeout_seconds: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./transfer"),
            slug_file: PathBuf::from("./slugs.json"),
            max_upload_mb: 500,
            allowed_extensions: [
                ".pdf", ".png", ".jpg", ".jpeg", ".zip", ".doc", ".docx", ".txt", ".csv", ".xlsx",
            ]
            .iter()
            .map(|ext| ext.to_string())
            .collect(),
            enforce_allowlist: true,
        }
    }
}

impl Default for SlugConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            length: 5,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            user_agent: "COPY-Uploader/1.0".to_string(),
            chunk_size: 8192,
            max_download_mb: 500,
            max_redirects: 10,
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("./static"),
            index_file: "index.html".to_string(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age_seconds: 3600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_requests: true,
            log_latency: true,
        }
    }
}

impl StorageConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(MEGABYTE)
    }
}

impl RemoteConfig {
    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_mb.saturating_mul(MEGABYTE)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?);

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(File::with_name("config"));
        }

        builder = builder.add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("storage.allowed_extensions")
                .with_list_parse_key("cors.allowed_origins")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port cannot be 0".to_string()));
        }

        if self.storage.max_upload_mb == 0 {
            return Err(ConfigError::Message(
                "Max upload size must be greater than 0".to_string(),
            ));
        }

        if self.storage.max_upload_mb.checked_mul(MEGABYTE).is_none() {
            return Err(ConfigError::Message(format!(
                "Max upload size of {} MB is too large",
                self.storage.max_upload_mb
            )));
        }

        if let Some(ext) = self
            .storage
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(ConfigError::Message(format!(
                "Allowed extension '{}' must start with a dot",
                ext
            )));
        }

        if self.slugs.length == 0 {
            return Err(ConfigError::Message(
                "Slug length must be greater than 0".to_string(),
            ));
        }

        if self.remote.chunk_size == 0 {
            return Err(ConfigError::Message(
                "Remote chunk size must be greater than 0".to_string(),
            ));
        }

        if self.remote.max_download_mb == 0 {
            return Err(ConfigError::Message(
                "Max download size must be greater than 0".to_string(),
            ));
        }

        if self.remote.max_download_mb.checked_mul(MEGABYTE).is_none() {
            return Err(ConfigError::Message(format!(
                "Max download size of {} MB is too large",
                self.remote.max_download_mb
            )));
        }

        if self.remote.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Remote timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn create_directories(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.storage.upload_dir)?;
        if let Some(parent) = self.storage.slug_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
