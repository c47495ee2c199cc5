use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;
use transfer_core::{
    create_app_with_config,
    files::{FileManager, FileManagerConfig, SpaceProbe, StorageStats},
    AppConfig, AppState,
};

const BOUNDARY: &str = "transfer-test-boundary";

struct StaticProbe {
    total: u64,
    free: u64,
}

impl SpaceProbe for StaticProbe {
    fn stats(&self, _path: &Path) -> transfer_core::Result<StorageStats> {
        Ok(StorageStats {
            total: self.total,
            used: self.total - self.free,
            free: self.free,
        })
    }
}

fn setup_app(temp_dir: &TempDir, free: u64) -> Router {
    let mut config = AppConfig::default();
    config.storage.upload_dir = temp_dir.path().join("transfer");
    config.storage.slug_file = temp_dir.path().join("slugs.json");
    config.frontend.static_dir = temp_dir.path().join("static");
    config.logging.log_requests = false;

    std::fs::create_dir_all(&config.frontend.static_dir).unwrap();
    std::fs::write(
        config.frontend.static_dir.join("index.html"),
        "<html>transfer</html>",
    )
    .unwrap();

    let probe = Arc::new(StaticProbe { total: 1000, free });
    let file_manager = FileManager::with_probe(FileManagerConfig::from(&config), probe).unwrap();

    create_app_with_config(AppState::new(file_manager), &config)
}

fn multipart_upload(field_name: &str, filename: &str, content: &[u8]) -> Request<Body> {
    multipart_upload_with_part_headers(field_name, filename, content, &[])
}

fn multipart_upload_with_part_headers(
    field_name: &str,
    filename: &str,
    content: &[u8],
    part_headers: &[(&str, &str)],
) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field_name, filename
        )
        .as_bytes(),
    );
    for (name, value) in part_headers {
        body.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::HOST, "files.local:8089")
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

#[tokio::test]
async fn test_upload_list_short_link_delete_flow() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    let response = app
        .clone()
        .oneshot(multipart_upload("file", "report.pdf", b"0123456789"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "report.pdf");
    assert_eq!(body["message"], "File uploaded successfully");

    let response = app.clone().oneshot(get("/api/files")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    let entries = listing.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "report.pdf");
    assert_eq!(entries[0]["size"], 10);
    assert_eq!(entries[0]["size_formatted"], "10 B");
    assert!(entries[0]["modified"].as_str().unwrap().contains('T'));

    let slug = entries[0]["short_code"].as_str().unwrap().to_string();
    assert_eq!(slug.len(), 5);
    assert_eq!(
        entries[0]["short_link"],
        format!("http://files.local:8089/s/{}", slug)
    );

    // Listing again keeps the same short code.
    let again = body_json(app.clone().oneshot(get("/api/files")).await.unwrap()).await;
    assert_eq!(again[0]["short_code"], slug.as_str());

    let response = app
        .clone()
        .oneshot(get(&format!("/s/{}", slug)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("report.pdf"));
    assert_eq!(body_bytes(response).await, b"0123456789");

    let response = app
        .clone()
        .oneshot(delete("/api/files/report.pdf"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "File deleted");

    let listing = body_json(app.clone().oneshot(get("/api/files")).await.unwrap()).await;
    assert!(listing.as_array().unwrap().is_empty());

    let response = app
        .clone()
        .oneshot(get(&format!("/s/{}", slug)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_direct_download() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    app.clone()
        .oneshot(multipart_upload("file", "notes.txt", b"hello"))
        .await
        .unwrap();

    let response = app.clone().oneshot(get("/download/notes.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"notes.txt\""
    );
    assert_eq!(body_bytes(response).await, b"hello");

    let response = app.oneshot(get("/download/missing.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejections() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    let response = app
        .clone()
        .oneshot(multipart_upload("file", "malware.exe", b"MZ"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("not allowed"));

    let response = app
        .clone()
        .oneshot(multipart_upload("attachment", "report.pdf", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(multipart_upload("file", "", b"data"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let listing = body_json(app.oneshot(get("/api/files")).await.unwrap()).await;
    assert!(listing.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_without_enough_space_leaves_nothing_behind() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 5);

    let response = app
        .clone()
        .oneshot(multipart_upload("file", "report.pdf", b"0123456789"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(!temp_dir.path().join("transfer").join("report.pdf").exists());
}

#[tokio::test]
async fn test_declared_part_length_is_checked_before_writing() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    // The body itself would fit; only the declared part length exceeds free space.
    let request = multipart_upload_with_part_headers(
        "file",
        "report.pdf",
        b"0123456789",
        &[("Content-Length", "10000")],
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Not enough free space"));

    assert!(!temp_dir.path().join("transfer").join("report.pdf").exists());

    let listing = body_json(app.oneshot(get("/api/files")).await.unwrap()).await;
    assert!(listing.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_path_traversal_is_forbidden() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);
    std::fs::write(temp_dir.path().join("secret.txt"), "secret").unwrap();

    let response = app
        .clone()
        .oneshot(get("/download/..%2Fsecret.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(delete("/api/files/..%2Fsecret.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(temp_dir.path().join("secret.txt").exists());
}

#[tokio::test]
async fn test_delete_twice_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    app.clone()
        .oneshot(multipart_upload("file", "once.csv", b"a,b"))
        .await
        .unwrap();

    let first = app.clone().oneshot(delete("/api/files/once.csv")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(delete("/api/files/once.csv")).await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_storage_endpoint() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    let response = app.oneshot(get("/api/storage")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total"], 1000);
    assert_eq!(body["used"], 400);
    assert_eq!(body["free"], 600);
    assert_eq!(body["free_formatted"], "600 B");
}

#[tokio::test]
async fn test_download_url_rejects_bad_requests() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    let response = app
        .clone()
        .oneshot(post_json("/api/download-url", r#"{"url": "ftp://x"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Only HTTP/HTTPS URLs are allowed");

    let response = app
        .clone()
        .oneshot(post_json("/api/download-url", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "URL missing");

    let response = app
        .oneshot(post_json("/api/download-url", "not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_index_is_served() {
    let temp_dir = TempDir::new().unwrap();
    let app = setup_app(&temp_dir, 600);

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"<html>transfer</html>");
}
