//! Storage module for persisting crawl data
//!
//! This module handles everything that touches disk:
//! - The content-addressed page store (SQLite metadata + blob files)
//! - Link relationship tracking
//! - The frontier's durable URL log

mod blobs;
mod frontier_log;
mod schema;
mod sqlite;
mod store;
mod traits;

pub use blobs::BlobStore;
pub use frontier_log::FrontierLog;
pub use sqlite::SqliteStorage;
pub use store::PageStore;
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A stored page, one per distinct URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub url: String,
    pub url_hash: String,
    pub domain: String,
    pub content_hash: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    pub content_type: String,
    pub status_code: u16,
    pub size_bytes: u64,
    pub parent_url: Option<String>,
    pub depth: u32,
    pub stored_at: DateTime<Utc>,
    pub link_count: u32,
    pub image_count: u32,
    /// Blob shared by every record with this content hash
    pub content_ref: String,
    pub metadata_ref: String,
    /// True if the body was already stored under another record
    pub is_duplicate: bool,
}

/// A `source -> target` edge of the link graph
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub source_url: String,
    pub target_url: String,
    pub discovered_at: DateTime<Utc>,
}

/// Aggregate storage statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageStats {
    pub total_pages: u64,
    pub duplicate_count: u64,
    /// Bytes held in distinct content blobs
    pub total_bytes: u64,
    pub total_links: u64,
    pub per_domain_counts: HashMap<String, u64>,
    pub per_content_type_counts: HashMap<String, u64>,
}

/// First 16 hex characters of SHA-256(url)
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Full SHA-256 hex digest of a body
pub fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
