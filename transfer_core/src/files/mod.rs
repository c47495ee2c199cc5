pub mod capacity;
pub mod catalog;
pub mod manager;
pub mod models;
pub mod path_guard;
pub mod remote;
pub mod slugs;
pub mod upload;
pub mod writer;

pub use capacity::{CapacityGuard, DiskSpaceProbe, SpaceProbe};
pub use catalog::StorageCatalog;
pub use manager::{FileManager, FileManagerConfig};
pub use models::{format_size, StorageStats, StorageStatsResponse, StoredFile};
pub use path_guard::{sanitize_filename, ExtensionPolicy, PathGuard};
pub use remote::{RemoteFetcher, RemoteFetcherConfig};
pub use slugs::SlugRegistry;
pub use upload::{BufferedUpload, UploadGateway, UploadSource};
pub use writer::AdmittedWriter;
