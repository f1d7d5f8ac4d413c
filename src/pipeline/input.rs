//! Input resolution: turn a row's `source_ref` into a decoded [`Document`].
//!
//! A source reference is one of:
//!
//! * an `http(s)://` URL, downloaded with reqwest. Google Drive share links
//!   (`/file/d/<ID>/view`, `open?id=<ID>`) are rewritten to the direct
//!   download endpoint first.
//! * a `file://` URL or a plain local path, read from disk.
//!
//! The fetched bytes are handed to a [`DocumentDecoder`] on a blocking
//! thread. Transport problems surface as [`FetchError::Unreachable`] (the
//! only retryable kind); a definite "no such document" answer (HTTP 404/410,
//! missing file) is [`FetchError::NotFound`].

use crate::config::BatchConfig;
use crate::error::FetchError;
use crate::model::Document;
use crate::pipeline::render::{DocumentDecoder, SourceDecoder};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Retrieves and decodes the document behind a source reference.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, source_ref: &str) -> Result<Document, FetchError>;
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

static DRIVE_FILE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"drive\.google\.com/file/d/([A-Za-z0-9_-]+)").unwrap());

static DRIVE_ID_QUERY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"drive\.google\.com/(?:open|uc)\?(?:[^#]*&)?id=([A-Za-z0-9_-]+)").unwrap()
});

/// Rewrite Google Drive share links to the direct-download endpoint.
/// Any other reference is returned unchanged.
pub fn direct_download_url(source_ref: &str) -> String {
    let id = DRIVE_FILE_PATH
        .captures(source_ref)
        .or_else(|| DRIVE_ID_QUERY.captures(source_ref))
        .and_then(|c| c.get(1));
    match id {
        Some(id) => format!(
            "https://drive.google.com/uc?export=download&id={}",
            id.as_str()
        ),
        None => source_ref.to_string(),
    }
}

/// Fetcher for HTTP(S) URLs and local files.
pub struct HttpFetcher {
    client: reqwest::Client,
    decoder: Arc<dyn DocumentDecoder>,
}

impl HttpFetcher {
    pub fn new(decoder: Arc<dyn DocumentDecoder>, timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| FetchError::Unreachable {
                source_ref: String::new(),
                reason: format!("HTTP client could not be built: {e}"),
            })?;
        Ok(Self { client, decoder })
    }

    /// Fetcher with a [`SourceDecoder`] at the configured `max_dpi` and
    /// render mode.
    pub fn standard(config: &BatchConfig) -> Result<Self, FetchError> {
        let decoder = SourceDecoder::new(config.raster.max_dpi, config.pdfium_lib_path.clone())
            .with_render_mode(config.render_mode);
        Self::new(Arc::new(decoder), config.download_timeout_secs)
    }

    async fn download(&self, source_ref: &str) -> Result<Vec<u8>, FetchError> {
        let url = direct_download_url(source_ref);
        info!("Downloading document from: {}", url);

        let unreachable = |reason: String| FetchError::Unreachable {
            source_ref: source_ref.to_string(),
            reason,
        };

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                unreachable("request timed out".into())
            } else {
                unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound {
                source_ref: source_ref.to_string(),
            });
        }
        if !status.is_success() {
            return Err(unreachable(format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    async fn read_local(&self, source_ref: &str) -> Result<Vec<u8>, FetchError> {
        let path = local_path(source_ref).ok_or_else(|| FetchError::NotFound {
            source_ref: source_ref.to_string(),
        })?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => FetchError::NotFound {
                source_ref: source_ref.to_string(),
            },
            _ => FetchError::Unreachable {
                source_ref: source_ref.to_string(),
                reason: format!("{}: {e}", path.display()),
            },
        })
    }
}

/// Filesystem path behind a `file://` URL or bare path.
fn local_path(source_ref: &str) -> Option<PathBuf> {
    if source_ref.starts_with("file://") {
        reqwest::Url::parse(source_ref).ok()?.to_file_path().ok()
    } else {
        Some(PathBuf::from(source_ref))
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, source_ref: &str) -> Result<Document, FetchError> {
        let source_ref = source_ref.trim();
        let bytes = if is_url(source_ref) {
            self.download(source_ref).await?
        } else {
            self.read_local(source_ref).await?
        };

        let decoder = Arc::clone(&self.decoder);
        tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| FetchError::DecodeFailure {
                reason: format!("decoder task failed: {e}"),
            })?
    }
}
