use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Crawl
///
/// Every key has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Initial URLs, crawled at depth 0
    pub seeds: Vec<String>,
    pub crawler: CrawlerConfig,
    pub filter: FilterConfig,
    pub politeness: PolitenessConfig,
    pub fetch: FetchConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum depth to crawl from seed URLs
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Global page budget, counted in attempted pages
    #[serde(rename = "max-pages")]
    pub max_pages: u64,

    /// Number of workers and the bound on in-flight fetches
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "request-delay")]
    pub request_delay: u64,

    /// Per-request network timeout (seconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// How long an idle worker sleeps before asking the frontier again (milliseconds)
    #[serde(rename = "poll-interval")]
    pub poll_interval: u64,

    /// Grace period granted to in-flight fetches on stop (milliseconds)
    #[serde(rename = "shutdown-grace-period")]
    pub shutdown_grace_period: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 1000,
            max_concurrent_requests: 10,
            request_delay: 1000,
            request_timeout: 30,
            poll_interval: 250,
            shutdown_grace_period: 2000,
        }
    }
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period)
    }
}

/// Link admission rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// When set, only these domains are admitted ("example.com" or "*.example.com")
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Option<Vec<String>>,

    /// Domains that are never admitted
    #[serde(rename = "blocked-domains")]
    pub blocked_domains: Vec<String>,

    /// Longest URL (in bytes) that will be admitted
    #[serde(rename = "max-url-length")]
    pub max_url_length: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allowed_domains: None,
            blocked_domains: Vec::new(),
            max_url_length: 2048,
        }
    }
}

/// Robots.txt and crawler identity
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    /// Whether robots.txt gates fetching at all
    #[serde(rename = "respect-robots-txt")]
    pub respect_robots_txt: bool,

    /// User-Agent header, also matched against robots.txt groups
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// How long a fetched robots.txt stays valid (seconds)
    #[serde(rename = "robots-cache-ttl")]
    pub robots_cache_ttl: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            respect_robots_txt: true,
            user_agent: "SumiCrawl/1.0 (+https://example.com/bot)".to_string(),
            robots_cache_ttl: 24 * 60 * 60,
        }
    }
}

/// Fetcher limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Content types (without parameters) the fetcher accepts
    #[serde(rename = "allowed-content-types")]
    pub allowed_content_types: Vec<String>,

    /// Largest body (in bytes) the fetcher will read
    #[serde(rename = "max-file-size")]
    pub max_file_size: u64,

    /// Global cap on concurrent connections
    #[serde(rename = "max-connections")]
    pub max_connections: u32,

    /// Cap on concurrent connections to a single host
    #[serde(rename = "max-connections-per-host")]
    pub max_connections_per_host: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            max_file_size: 10 * 1024 * 1024,
            max_connections: 100,
            max_connections_per_host: 10,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for content blobs and metadata files
    #[serde(rename = "storage-dir")]
    pub storage_dir: PathBuf,

    /// Page metadata database (defaults to `<storage-dir>/crawler.db`)
    #[serde(rename = "database-path")]
    pub database_path: Option<PathBuf>,

    /// Frontier database (defaults to `<storage-dir>/frontier.db`)
    #[serde(rename = "frontier-path")]
    pub frontier_path: Option<PathBuf>,

    /// Markdown report (defaults to `<storage-dir>/summary.md`)
    #[serde(rename = "summary-path")]
    pub summary_path: Option<PathBuf>,

    /// Log filter used when no verbosity flag is given
    #[serde(rename = "log-level")]
    pub log_level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./crawl_data"),
            database_path: None,
            frontier_path: None,
            summary_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("crawler.db"))
    }

    pub fn frontier_path(&self) -> PathBuf {
        self.frontier_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("frontier.db"))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.summary_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("summary.md"))
    }
}
