//! Route table for the transfer API

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::files;
use crate::AppState;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/api/files", get(files::list_files))
        .route("/api/files/*filename", delete(files::delete_file))
        .route("/api/upload", post(files::upload_file))
        .route("/api/download-url", post(files::download_from_url))
        .route("/api/storage", get(files::storage_info))
        .route("/download/*filename", get(files::download_file))
        .route("/s/:slug", get(files::resolve_short_link))
}
