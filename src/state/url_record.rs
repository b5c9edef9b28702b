use crate::state::UrlStatus;
use chrono::{DateTime, Utc};

/// Priority given to seed URLs
pub const SEED_PRIORITY: u32 = 100;

/// A URL known to the frontier
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    pub url: String,
    pub domain: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    /// Higher values are dequeued first within a domain
    pub priority: u32,
    pub discovered_at: DateTime<Utc>,
    pub status: UrlStatus,
}

impl UrlRecord {
    /// Creates a pending seed record
    pub fn seed(url: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            domain: domain.into(),
            depth: 0,
            parent_url: None,
            priority: SEED_PRIORITY,
            discovered_at: Utc::now(),
            status: UrlStatus::Pending,
        }
    }

    /// Creates a pending record for a link found on `parent_url`
    pub fn discovered(
        url: impl Into<String>,
        domain: impl Into<String>,
        depth: u32,
        parent_url: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            domain: domain.into(),
            depth,
            parent_url: Some(parent_url.into()),
            priority: priority_for_depth(depth),
            discovered_at: Utc::now(),
            status: UrlStatus::Pending,
        }
    }
}

/// Priority of a URL discovered at `depth`: 10 points less per hop
pub fn priority_for_depth(depth: u32) -> u32 {
    SEED_PRIORITY.saturating_sub(depth.saturating_mul(10))
}
