//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client (user agent, timeout, no redirect following)
//! - Global and per-host connection limits
//! - Content-type and size checks, with the body streamed under a hard cap
//! - Charset decoding
//! - Classification of every outcome into a [`FetchResult`]

use crate::config::Config;
use crate::crawler::document::FetchedDocument;
use crate::url::extract_domain;
use crate::FailureReason;
use chrono::Utc;
use encoding_rs::Encoding;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// The page was fetched and decoded
    Success(FetchedDocument),

    /// The response was skipped by policy (content type, declared size)
    Filtered(FailureReason),

    /// The fetch failed
    Failed(FailureReason),
}

impl FetchResult {
    /// The failure reason, if this is not a success
    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Success(_) => None,
            Self::Filtered(reason) | Self::Failed(reason) => Some(reason),
        }
    }
}

/// Running request counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FetcherStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Every non-success outcome, filtered ones included
    pub failed_requests: u64,
    pub bytes_downloaded: u64,
}

impl FetcherStats {
    /// Successful requests as a percentage of all requests
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are never followed; a redirect response is reported as a
/// failure carrying its `Location`.
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(&config.politeness.user_agent)
        .timeout(config.crawler.request_timeout())
        .redirect(Policy::none())
        .pool_max_idle_per_host(config.fetch.max_connections_per_host as usize)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Bounded HTTP fetcher
pub struct Fetcher {
    client: Client,
    allowed_content_types: Vec<String>,
    max_file_size: u64,
    connections: Arc<Semaphore>,
    max_connections_per_host: usize,
    host_connections: Mutex<HashMap<String, Arc<Semaphore>>>,
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl Fetcher {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        Ok(Self {
            client,
            allowed_content_types: config
                .fetch
                .allowed_content_types
                .iter()
                .map(|ct| ct.trim().to_lowercase())
                .collect(),
            max_file_size: config.fetch.max_file_size,
            connections: Arc::new(Semaphore::new(config.fetch.max_connections as usize)),
            max_connections_per_host: config.fetch.max_connections_per_host as usize,
            host_connections: Mutex::new(HashMap::new()),
            total: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        })
    }

    /// Fetches a URL and classifies the outcome
    ///
    /// # Request Flow
    ///
    /// 1. Reject malformed URLs → `Failed(InvalidUrl)`
    /// 2. Acquire a global and a per-host connection slot
    /// 3. Send the GET; timeouts and transport errors → `Failed`
    /// 4. Classify non-200 statuses (redirects are not followed)
    /// 5. For 200: check the content type and declared length → `Filtered`,
    ///    then stream the body, aborting once it exceeds the size limit
    pub async fn fetch(&self, url: &str, depth: u32, parent_url: Option<&str>) -> FetchResult {
        self.total.fetch_add(1, Ordering::Relaxed);
        let result = self.fetch_inner(url, depth, parent_url).await;

        match &result {
            FetchResult::Success(doc) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(doc.size_bytes, Ordering::Relaxed);
                tracing::debug!("Fetched {} ({} bytes)", url, doc.size_bytes);
            }
            FetchResult::Filtered(reason) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Filtered {}: {}", url, reason);
            }
            FetchResult::Failed(reason) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Failed to fetch {}: {}", url, reason);
            }
        }
        result
    }

    async fn fetch_inner(&self, url: &str, depth: u32, parent_url: Option<&str>) -> FetchResult {
        let parsed = match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
            Ok(parsed) => {
                return FetchResult::Failed(FailureReason::InvalidUrl(format!(
                    "unsupported scheme '{}'",
                    parsed.scheme()
                )))
            }
            Err(e) => return FetchResult::Failed(FailureReason::InvalidUrl(e.to_string())),
        };
        let Some(domain) = extract_domain(&parsed) else {
            return FetchResult::Failed(FailureReason::InvalidUrl("missing host".to_string()));
        };

        let _permits = match self.acquire(&domain).await {
            Some(permits) => permits,
            None => {
                return FetchResult::Failed(FailureReason::NetworkError(
                    "connection pool closed".to_string(),
                ))
            }
        };

        let response = match self.client.get(parsed).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return FetchResult::Failed(FailureReason::Timeout),
            Err(e) => return FetchResult::Failed(FailureReason::NetworkError(e.to_string())),
        };

        // Content checks come first, so a non-HTML error page is filtered
        let content_type = match mime_type(response.headers()) {
            Some(ct) if self.allowed_content_types.contains(&ct) => ct,
            Some(ct) => return FetchResult::Filtered(FailureReason::UnsupportedContentType(ct)),
            None => {
                return FetchResult::Filtered(FailureReason::UnsupportedContentType(
                    "(none)".to_string(),
                ))
            }
        };

        if let Some(declared) = declared_length(response.headers()) {
            if declared > self.max_file_size {
                return FetchResult::Filtered(FailureReason::OversizedContent {
                    limit: self.max_file_size,
                    observed: declared,
                });
            }
        }

        let status = response.status();
        if status != StatusCode::OK {
            return FetchResult::Failed(classify_status(status, response.headers()));
        }

        let headers = header_map(response.headers());
        let charset = charset(response.headers());
        let bytes = match self.read_body(response).await {
            Ok(bytes) => bytes,
            Err(reason) => return FetchResult::Failed(reason),
        };

        FetchResult::Success(FetchedDocument {
            url: url.to_string(),
            status_code: status.as_u16(),
            content_type,
            size_bytes: bytes.len() as u64,
            body: decode_body(&bytes, charset.as_deref()).into_owned(),
            headers,
            parent_url: parent_url.map(str::to_string),
            depth,
            fetched_at: Utc::now(),
        })
    }

    async fn acquire(&self, domain: &str) -> Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
        let host = {
            let mut hosts = self
                .host_connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                hosts
                    .entry(domain.to_string())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.max_connections_per_host))),
            )
        };
        let global = Arc::clone(&self.connections).acquire_owned().await.ok()?;
        let host = host.acquire_owned().await.ok()?;
        Some((global, host))
    }

    /// Streams the body, never holding more than `max_file_size` bytes
    async fn read_body(&self, mut response: Response) -> Result<Vec<u8>, FailureReason> {
        let mut body = Vec::new();
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) if e.is_timeout() => return Err(FailureReason::Timeout),
                Err(e) => return Err(FailureReason::NetworkError(e.to_string())),
            };

            let observed = (body.len() + chunk.len()) as u64;
            if observed > self.max_file_size {
                return Err(FailureReason::OversizedContent {
                    limit: self.max_file_size,
                    observed,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    pub fn stats(&self) -> FetcherStats {
        FetcherStats {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.succeeded.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Maps a non-200 status to its failure reason
fn classify_status(status: StatusCode, headers: &HeaderMap) -> FailureReason {
    match status.as_u16() {
        301 | 302 | 303 | 307 | 308 => FailureReason::RedirectNotFollowed {
            status: status.as_u16(),
            location: headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        },
        403 => FailureReason::RobotsOrAccessDenied(format!("HTTP {}", status)),
        404 => FailureReason::NotFound,
        429 => FailureReason::RateLimited,
        code if code >= 500 => FailureReason::ServerError(code),
        code => FailureReason::UnexpectedStatus(code),
    }
}

/// MIME type without parameters, lowercased
fn mime_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mime = value.split(';').next()?.trim().to_lowercase();
    if mime.is_empty() {
        None
    } else {
        Some(mime)
    }
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

/// The `charset` parameter of the Content-Type header
fn charset(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    value.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

/// Decodes a body with the declared charset
///
/// Unknown labels and invalid byte sequences fall back to lossy UTF-8.
pub fn decode_body<'a>(bytes: &'a [u8], charset: Option<&str>) -> Cow<'a, str> {
    if let Some(encoding) = charset.and_then(|label| Encoding::for_label(label.as_bytes())) {
        if let Some(decoded) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return decoded;
        }
    }
    String::from_utf8_lossy(bytes)
}
