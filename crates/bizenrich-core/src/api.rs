//! HTTP client for the scraping backend.
//!
//! Every transport failure is converted into an [`ApiError`] here, so callers
//! only ever see user-presentable categories, never raw `reqwest` errors.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::Config;
use crate::model::{BatchStatus, UploadResponse};
use crate::sse::{SseDecoder, SseFrame};
use crate::stream::BatchBackend;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("backend is not reachable at {url} (connection refused)")]
    ConnectionRefused { url: String },
    #[error("request timed out: file too large or connection slow")]
    Timeout,
    #[error("file too large for the backend")]
    PayloadTooLarge,
    #[error("invalid file type: only CSV files are accepted")]
    InvalidFileType,
    #[error("backend endpoint not found: {0}")]
    EndpointNotFound(String),
    #[error("batch {0} not found; it may have expired")]
    BatchNotFound(String),
    #[error("request blocked before the backend answered: {0}")]
    Blocked(String),
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed backend response: {0}")]
    Decode(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("cannot read {path}: {reason}")]
    File { path: String, reason: String },
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Availability of the backend and the services behind it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub api: bool,
    pub redis: bool,
    pub worker: bool,
}

impl HealthReport {
    pub fn all_up(&self) -> bool {
        self.api && self.redis && self.worker
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: Config,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        // No client-wide timeout: it would also cut the long-lived stream.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("bizenrich/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Upload a CSV file, creating a new batch.
    pub async fn upload_csv(&self, path: &Path) -> Result<UploadResponse, ApiError> {
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(ApiError::InvalidFileType);
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.csv".to_string());
        let owned = path.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(&owned))
            .await
            .map_err(|e| ApiError::File {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .map_err(|e| ApiError::File {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        log::info!("uploading {} ({} bytes)", file_name, bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")
            .map_err(|e| ApiError::Client(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = self.config.api_url("scraping-batch");
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.config.upload_timeout)
            .send()
            .await
            .map_err(|e| classify_transport(&e, &url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = classify_upload_status(status, &body);
            log::warn!("upload rejected: {err}");
            return Err(err);
        }

        let upload: UploadResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        log::info!(
            "batch {} created with {} jobs",
            upload.batch_id,
            upload.jobs_created
        );
        Ok(upload)
    }

    /// Fetch the current status (progress and known results) of a batch.
    pub async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, ApiError> {
        let url = self.config.api_url(&format!("scraping-batch/{batch_id}"));
        let resp = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| classify_transport(&e, &url))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::BatchNotFound(batch_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: extract_message(status, &body),
            });
        }

        resp.json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Open the live event stream of a batch.
    pub async fn open_stream(
        &self,
        batch_id: &str,
    ) -> Result<BoxStream<'static, Result<SseFrame, ApiError>>, ApiError> {
        let url = self
            .config
            .api_url(&format!("scraping-batch/{batch_id}/stream"));
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| classify_transport(&e, &url))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::BatchNotFound(batch_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: extract_message(status, &body),
            });
        }

        Ok(sse_frames(resp.bytes_stream()))
    }

    /// Download the backend's CSV export of a batch. Returns the file name
    /// to save under and the raw bytes.
    pub async fn export_csv(&self, batch_id: &str) -> Result<(String, Vec<u8>), ApiError> {
        let url = self
            .config
            .api_url(&format!("scraping-batch/{batch_id}/export"));
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/csv")
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| classify_transport(&e, &url))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::BatchNotFound(batch_id.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: extract_message(status, &body),
            });
        }

        let filename = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| timestamped_filename("csv", Local::now()));
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| classify_transport(&e, &url))?;
        Ok((filename, bytes.to_vec()))
    }

    /// Probe the API, Redis and worker health endpoints concurrently.
    pub async fn health(&self) -> HealthReport {
        let (api, redis, worker) = tokio::join!(
            self.probe("health", true),
            self.probe("health/redis", false),
            self.probe("health/worker", false),
        );
        HealthReport { api, redis, worker }
    }

    async fn probe(&self, route: &str, expect_ok_status: bool) -> bool {
        let url = self.config.root_url(route);
        let resp = match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                log::debug!("{url}: HTTP {}", r.status());
                return false;
            }
            Err(e) => {
                log::debug!("{url}: {e}");
                return false;
            }
        };
        if !expect_ok_status {
            return true;
        }
        match resp.json::<serde_json::Value>().await {
            Ok(body) => body.get("status").and_then(|s| s.as_str()) == Some("ok"),
            Err(_) => false,
        }
    }
}

impl BatchBackend for ApiClient {
    async fn fetch_status(&self, batch_id: &str) -> Result<BatchStatus, ApiError> {
        self.batch_status(batch_id).await
    }

    async fn open_events(
        &self,
        batch_id: &str,
    ) -> Result<BoxStream<'static, Result<SseFrame, ApiError>>, ApiError> {
        self.open_stream(batch_id).await
    }
}

/// Turn a byte stream into a stream of SSE frames. The stream ends with the
/// first transport error.
pub fn sse_frames<S, B>(bytes: S) -> BoxStream<'static, Result<SseFrame, ApiError>>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = (Box::pin(bytes), SseDecoder::new(), VecDeque::new(), false);
    stream::unfold(state, |(mut bytes, mut decoder, mut pending, failed)| async move {
        if failed {
            return None;
        }
        loop {
            if let Some(frame) = pending.pop_front() {
                return Some((Ok(frame), (bytes, decoder, pending, false)));
            }
            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(decoder.feed(chunk.as_ref())),
                Some(Err(e)) => {
                    return Some((
                        Err(ApiError::Stream(e.to_string())),
                        (bytes, decoder, pending, true),
                    ));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

/// Map a transport-level failure (no HTTP status) to a category.
fn classify_transport(err: &reqwest::Error, url: &str) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_connect() {
        ApiError::ConnectionRefused {
            url: url.to_string(),
        }
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Blocked(err.to_string())
    }
}

/// Map a non-success upload response to a category.
pub fn classify_upload_status(status: StatusCode, body: &str) -> ApiError {
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ApiError::InvalidFileType,
        StatusCode::NOT_FOUND => ApiError::EndpointNotFound("scraping-batch".to_string()),
        _ => ApiError::Rejected {
            status: status.as_u16(),
            message: extract_message(status, body),
        },
    }
}

/// Pull a human-readable message out of an error body.
fn extract_message(status: StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

/// Extract `filename` from a `Content-Disposition` header value.
fn disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|part| {
        let (key, val) = part.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("filename") {
            let name = val.trim().trim_matches('"');
            // never let the server choose a directory
            let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
            (!name.is_empty()).then(|| name.to_string())
        } else {
            None
        }
    })
}

/// `scraping-results-<YYYY-MM-DDTHH-MM-SS>.<ext>`
pub fn timestamped_filename(ext: &str, now: DateTime<Local>) -> String {
    format!("scraping-results-{}.{ext}", now.format("%Y-%m-%dT%H-%M-%S"))
}
