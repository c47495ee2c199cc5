use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, Request, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use crate::{
    error::{AppError, Result},
    files::{BufferedUpload, StorageStatsResponse, StoredFile},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct FileEntryResponse {
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
    pub modified: String,
    pub modified_timestamp: i64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub short: Option<ShortLinkFields>,
}

#[derive(Debug, Serialize)]
pub struct ShortLinkFields {
    pub short_code: Option<String>,
    pub short_link: Option<String>,
}

impl From<StoredFile> for FileEntryResponse {
    fn from(file: StoredFile) -> Self {
        Self {
            size_formatted: file.size_formatted(),
            modified: file.modified_iso(),
            modified_timestamp: file.modified_timestamp,
            size: file.size,
            name: file.name,
            short: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadUrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileEntryResponse>>> {
    let file_manager = &state.file_manager;
    let files = file_manager.list_files().await?;
    let base = public_base_url(&headers);

    let entries = files
        .into_iter()
        .map(|file| {
            let name = file.name.clone();
            let mut entry = FileEntryResponse::from(file);

            entry.short = file_manager.short_code(&name).map(|result| match result {
                Ok(slug) => ShortLinkFields {
                    short_link: Some(format!("{}/s/{}", base, slug)),
                    short_code: Some(slug),
                },
                Err(e) => {
                    warn!("Could not create short link for {}: {}", name, e);
                    ShortLinkFields {
                        short_code: None,
                        short_link: None,
                    }
                }
            });

            entry
        })
        .collect();

    Ok(Json(entries))
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileActionResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let declared_name = field.file_name().map(str::to_string);
        let stored = state
            .file_manager
            .store_upload(Some(field), declared_name.as_deref())
            .await?;

        return Ok(Json(FileActionResponse {
            success: true,
            filename: Some(stored.name),
            message: "File uploaded successfully".to_string(),
        }));
    }

    // No `file` part: let the gateway report the missing upload.
    let stored = state
        .file_manager
        .store_upload(None::<BufferedUpload>, None)
        .await?;

    Ok(Json(FileActionResponse {
        success: true,
        filename: Some(stored.name),
        message: "File uploaded successfully".to_string(),
    }))
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response> {
    let path = state.file_manager.locate(&filename).await?;
    serve_attachment(path, request).await
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<FileActionResponse>> {
    state.file_manager.delete_file(&filename).await?;

    Ok(Json(FileActionResponse {
        success: true,
        filename: None,
        message: "File deleted".to_string(),
    }))
}

/// Accepts any body; a missing or malformed JSON document counts as a missing URL.
pub async fn download_from_url(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<FileActionResponse>> {
    let request: DownloadUrlRequest = serde_json::from_slice(&body).unwrap_or_default();
    let url = request.url.as_deref().map(str::trim).unwrap_or_default();

    if url.is_empty() {
        return Err(AppError::InvalidInput("URL missing".to_string()));
    }

    info!("Fetching remote file from {}", url);
    let stored = state.file_manager.fetch_remote(url).await?;

    Ok(Json(FileActionResponse {
        success: true,
        filename: Some(stored.name),
        message: "File downloaded successfully".to_string(),
    }))
}

pub async fn storage_info(State(state): State<AppState>) -> Result<Json<StorageStatsResponse>> {
    let stats = state.file_manager.storage_stats().await?;
    Ok(Json(stats.into()))
}

pub async fn resolve_short_link(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    request: Request,
) -> Result<Response> {
    let path = state.file_manager.resolve_slug(&slug).await?;
    serve_attachment(path, request).await
}

async fn serve_attachment(path: PathBuf, request: Request) -> Result<Response> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .map_err(|e| AppError::Internal(format!("failed to serve {}: {}", path.display(), e)))?;

    let mut response = response.map(Body::new);
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, attachment_disposition(&filename));
    }

    Ok(response.into_response())
}

fn attachment_disposition(filename: &str) -> HeaderValue {
    let plain_safe = filename
        .chars()
        .all(|c| (c.is_ascii_graphic() || c == ' ') && c != '"' && c != '\\');

    let value = if plain_safe {
        format!("attachment; filename=\"{}\"", filename)
    } else {
        format!("attachment; filename*=UTF-8''{}", urlencoding::encode(filename))
    };

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// `scheme://host` as seen by the client, or empty when no Host header was sent.
fn public_base_url(headers: &HeaderMap) -> String {
    let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) else {
        return String::new();
    };

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|proto| matches!(*proto, "http" | "https"))
        .unwrap_or("http");

    format!("{}://{}", scheme, host)
}
