pub mod settings;

pub use settings::{
    AppConfig, CorsConfig, FrontendConfig, LoggingConfig, RemoteConfig, ServerConfig,
    SlugConfig, StorageConfig,
};
