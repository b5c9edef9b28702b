//! Sumi-Crawl: a polite, concurrent web crawler
//!
//! This crate implements a crawling pipeline made of a persistent frontier,
//! a robots.txt policy cache, a bounded fetcher, an HTML parser and a
//! content-addressed store, driven by a pool of async workers.

pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Crawl operations
///
/// These are the fatal conditions: anything that prevents a component from
/// starting. Per-URL problems are reported as [`FailureReason`] instead.
#[derive(Debug, Error)]
pub enum SumiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Why a single URL could not be crawled
///
/// Every non-success outcome of the pipeline maps to one of these. They are
/// values, not control flow: the coordinator records them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Content exceeds {limit} bytes (saw {observed})")]
    OversizedContent { limit: u64, observed: u64 },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Redirect {status} to {location} not followed")]
    RedirectNotFollowed { status: u16, location: String },

    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    #[error("Unexpected status: HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("Access denied: {0}")]
    RobotsOrAccessDenied(String),

    #[error("Parse degraded: {0}")]
    ParseDegraded(String),

    #[error("Storage write failed: {0}")]
    StorageWriteFailed(String),
}

/// Result type alias for Sumi-Crawl operations
pub type Result<T> = std::result::Result<T, SumiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlSnapshot, CrawlStats};
pub use state::UrlStatus;
pub use url::{extract_domain, normalize_url};
