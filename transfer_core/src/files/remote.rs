//! Pull a remote HTTP(S) resource into the storage directory.
//!
//! The body is streamed to disk in bounded chunks with capacity admission and
//! a hard size cap checked after every chunk. Any failure after the
//! destination was created removes the partial file. The fetch runs inside the
//! caller's future, so dropping that future (e.g. the client went away)
//! cancels the transfer and triggers the same cleanup.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_DISPOSITION};
use reqwest::Client;
use tokio::fs as async_fs;
use tracing::{debug, info};
use url::Url;

use crate::error::{AppError, Result};
use super::capacity::CapacityGuard;
use super::models::StoredFile;
use super::path_guard::{sanitize_or_fallback, ExtensionPolicy, PathGuard};
use super::writer::AdmittedWriter;

pub const DEFAULT_USER_AGENT: &str = "COPY-Uploader/1.0";

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

const DEFAULT_MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct RemoteFetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub chunk_size: usize,
    pub max_bytes: u64,
    pub max_redirects: usize,
}

impl Default for RemoteFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

#[derive(Clone)]
pub struct RemoteFetcher {
    client: Client,
    guard: PathGuard,
    capacity: CapacityGuard,
    policy: ExtensionPolicy,
    chunk_size: usize,
    max_bytes: u64,
}

impl RemoteFetcher {
    pub fn new(
        config: RemoteFetcherConfig,
        guard: PathGuard,
        capacity: CapacityGuard,
        policy: ExtensionPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            guard,
            capacity,
            policy,
            chunk_size: config.chunk_size.max(1),
            max_bytes: config.max_bytes,
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<StoredFile> {
        let url = validate_url(url)?;

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| AppError::UpstreamFetchFailed(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamFetchFailed(format!(
                "{} answered with HTTP {}",
                url,
                response.status()
            )));
        }

        let filename = derive_filename(response.headers(), response.url());
        self.policy.check(&filename)?;
        let destination = self.guard.resolve(&filename)?;

        if let Some(declared) = response.content_length() {
            if declared > self.max_bytes {
                return Err(AppError::PayloadTooLarge { limit: self.max_bytes });
            }
            self.capacity.ensure_available(Some(declared))?;
        }

        debug!("Fetching {} into {}", response.url(), destination.display());

        async_fs::create_dir_all(self.guard.root()).await?;
        let mut writer =
            AdmittedWriter::create(&destination, self.capacity.clone(), Some(self.max_bytes))
                .await?;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                AppError::UpstreamFetchFailed(format!("reading body of {} failed: {}", url, e))
            })?;
            for piece in chunk.chunks(self.chunk_size) {
                writer.write_chunk(piece).await?;
            }
        }

        let size = writer.finish().await?;
        info!("Downloaded {} as {} ({} bytes)", url, filename, size);

        Ok(StoredFile {
            name: filename,
            size,
            modified_timestamp: chrono::Utc::now().timestamp(),
        })
    }
}

/// Only `http` and `https` URLs are fetched.
pub fn validate_url(raw: &str) -> Result<Url> {
    let lowered = raw.trim().to_ascii_lowercase();
    if !(lowered.starts_with("http://") || lowered.starts_with("https://")) {
        return Err(AppError::UnsupportedScheme);
    }

    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::InvalidInput(format!("Invalid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(AppError::UnsupportedScheme),
    }
}

/// Content-Disposition filename, then the last segment of the final URL,
/// then `download_<unix timestamp>`; always sanitized.
pub fn derive_filename(headers: &HeaderMap, final_url: &Url) -> String {
    let from_header = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_disposition);

    let candidate = from_header
        .filter(|name| !name.is_empty())
        .or_else(|| last_path_segment(final_url))
        .unwrap_or_default();

    sanitize_or_fallback(&candidate)
}

fn last_path_segment(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    if segment.is_empty() {
        return None;
    }
    Some(
        urlencoding::decode(segment)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| segment.to_string()),
    )
}

/// Extract `filename*` (RFC 5987, preferred) or `filename` from a
/// Content-Disposition value.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(value).into_iter().skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();

        match key.as_str() {
            "filename*" => extended = decode_extended_value(raw),
            "filename" => plain = Some(unquote(raw)),
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.is_empty())
}

fn split_params(value: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ';' if !in_quotes => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    params.push(current);

    params
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn decode_extended_value(raw: &str) -> Option<String> {
    let raw = unquote(raw);
    let mut parts = raw.splitn(3, '\'');
    let charset = parts.next()?.to_ascii_lowercase();
    let _language = parts.next()?;
    let encoded = parts.next()?;

    let bytes = urlencoding::decode_binary(encoded.as_bytes());
    match charset.as_str() {
        "utf-8" | "utf8" => String::from_utf8(bytes.into_owned()).ok(),
        _ => Some(bytes.iter().map(|&b| b as char).collect()),
    }
}
