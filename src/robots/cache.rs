//! Robots.txt caching implementation
//!
//! One [`DomainPolicy`] is kept per domain and replaced wholesale once it is
//! older than the configured TTL. Each domain has its own async lock, so
//! concurrent first requests for a domain wait on a single robots fetch.

use crate::config::Config;
use crate::robots::parser::{product_token, ParsedRobots};
use crate::url::{domain_of, extract_domain};
use chrono::{DateTime, Utc};
use reqwest::{redirect, Client, Response, StatusCode};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

/// Crawl permissions for one domain
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    pub domain: String,
    /// Whether the site root may be fetched
    pub can_fetch: bool,
    pub crawl_delay: Option<Duration>,
    pub sitemap_urls: BTreeSet<String>,
    pub fetched_at: DateTime<Utc>,
    rules: ParsedRobots,
    agent: String,
}

impl DomainPolicy {
    pub fn new(domain: impl Into<String>, rules: ParsedRobots, user_agent: &str) -> Self {
        Self {
            domain: domain.into(),
            can_fetch: rules.is_allowed("/", user_agent),
            crawl_delay: rules.crawl_delay(user_agent),
            sitemap_urls: rules.sitemaps().into_iter().collect(),
            fetched_at: Utc::now(),
            rules,
            agent: user_agent.to_string(),
        }
    }

    /// A policy with no restrictions
    pub fn allow_all(domain: impl Into<String>, user_agent: &str) -> Self {
        Self::new(domain, ParsedRobots::allow_all(), user_agent)
    }

    /// Checks a specific URL against the stored rules
    pub fn allows(&self, url: &str) -> bool {
        self.rules.is_allowed(url, &self.agent)
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.fetched_at
    }

    pub fn is_stale(&self, ttl: chrono::Duration) -> bool {
        self.age() >= ttl
    }
}

/// Counters exposed in the crawl snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RobotsStats {
    pub domains_cached: usize,
    pub fetches: u64,
    pub fetch_failures: u64,
}

type PolicySlot = Arc<AsyncMutex<Option<Arc<DomainPolicy>>>>;

/// Per-domain robots.txt policy cache
pub struct RobotsCache {
    client: Client,
    user_agent: String,
    enabled: bool,
    ttl: chrono::Duration,
    request_delay: Duration,
    max_body: u64,
    entries: Mutex<HashMap<String, PolicySlot>>,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
}

impl RobotsCache {
    /// Builds the cache and its HTTP client from the crawl configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(&config.politeness.user_agent)
            .timeout(config.crawler.request_timeout())
            .redirect(redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            user_agent: config.politeness.user_agent.clone(),
            enabled: config.politeness.respect_robots_txt,
            ttl: chrono::Duration::seconds(config.politeness.robots_cache_ttl as i64),
            request_delay: config.crawler.request_delay(),
            max_body: config.fetch.max_file_size,
            entries: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        })
    }

    /// Whether `url` may be fetched under its domain's robots.txt
    ///
    /// Always true without any network access when robots handling is off.
    /// URLs without a host are left for the fetcher to reject.
    pub async fn can_fetch(&self, url: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let Some((scheme, domain)) = split_origin(url) else {
            return true;
        };

        let policy = self.policy(&scheme, &domain).await;
        let allowed = policy.allows(url);
        if !allowed {
            tracing::info!("robots.txt disallows {}", url);
        }
        allowed
    }

    /// Effective delay for the domain of `url`: the robots crawl-delay or the
    /// configured request delay, whichever is longer
    pub async fn crawl_delay(&self, url: &str) -> Duration {
        if !self.enabled {
            return self.request_delay;
        }
        let robots_delay = match split_origin(url) {
            Some((scheme, domain)) => self.policy(&scheme, &domain).await.crawl_delay,
            None => None,
        };
        robots_delay.map_or(self.request_delay, |d| d.max(self.request_delay))
    }

    /// Crawl-delay declared by the robots.txt of `url`'s domain, if any
    pub async fn robots_delay(&self, url: &str) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let (scheme, domain) = split_origin(url)?;
        self.policy(&scheme, &domain).await.crawl_delay
    }

    /// Sitemap URLs listed in a domain's robots.txt
    pub async fn sitemaps(&self, domain: &str) -> BTreeSet<String> {
        if !self.enabled {
            return BTreeSet::new();
        }
        self.policy("https", domain).await.sitemap_urls.clone()
    }

    /// Loads or refreshes the policy for a domain
    pub async fn policy(&self, scheme: &str, domain: &str) -> Arc<DomainPolicy> {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(domain.to_string()).or_default())
        };

        let mut cached = slot.lock().await;
        if let Some(policy) = cached.as_ref() {
            if !policy.is_stale(self.ttl) {
                return Arc::clone(policy);
            }
            tracing::debug!("robots.txt for {} expired, refreshing", domain);
        }

        let policy = Arc::new(self.fetch_policy(scheme, domain).await);
        *cached = Some(Arc::clone(&policy));
        policy
    }

    async fn fetch_policy(&self, scheme: &str, domain: &str) -> DomainPolicy {
        let robots_url = format!("{}://{}/robots.txt", scheme, domain);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Fetching {}", robots_url);

        let rules = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                match self.read_body(response).await {
                    Ok(body) => ParsedRobots::from_content(&body),
                    Err(reason) => {
                        self.record_failure(&robots_url, &reason);
                        ParsedRobots::allow_all()
                    }
                }
            }
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                tracing::debug!("No robots.txt at {}", robots_url);
                ParsedRobots::allow_all()
            }
            Ok(response) => {
                self.record_failure(&robots_url, &format!("HTTP {}", response.status()));
                ParsedRobots::allow_all()
            }
            Err(e) => {
                self.record_failure(&robots_url, &e.to_string());
                ParsedRobots::allow_all()
            }
        };

        let policy = DomainPolicy::new(domain, rules, &self.user_agent);
        if let Some(delay) = policy.crawl_delay {
            tracing::debug!("{} requests a crawl delay of {:?}", domain, delay);
        }
        policy
    }

    /// Streams a robots.txt body, giving up past `max_body` bytes
    async fn read_body(&self, mut response: Response) -> Result<String, String> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            if (body.len() + chunk.len()) as u64 > self.max_body {
                return Err(format!("body exceeds {} bytes", self.max_body));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn record_failure(&self, robots_url: &str, reason: &str) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("Could not fetch {} ({}), allowing all", robots_url, reason);
    }

    pub fn product_token(&self) -> &str {
        product_token(&self.user_agent)
    }

    pub fn stats(&self) -> RobotsStats {
        let domains_cached = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        RobotsStats {
            domains_cached,
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

/// `(scheme, domain)` of a URL string
fn split_origin(url: &str) -> Option<(String, String)> {
    match Url::parse(url) {
        Ok(parsed) => {
            let domain = extract_domain(&parsed)?;
            Some((parsed.scheme().to_string(), domain))
        }
        Err(_) => domain_of(url).map(|domain| ("https".to_string(), domain)),
    }
}
