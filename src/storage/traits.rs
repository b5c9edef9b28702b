//! Storage traits and error types
//!
//! This module defines the trait interface for the page metadata backend and
//! the associated error types.

use crate::storage::{LinkRecord, StorageStats, StoredRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record for {url}: {message}")]
    Corrupt { url: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for page metadata backends
///
/// Implementations are not required to be thread-safe; callers serialize
/// access (see [`crate::storage::PageStore`]).
pub trait Storage {
    // ===== Content blobs =====

    /// Registers a content hash
    ///
    /// Returns `true` if the hash was new, `false` if a blob with this hash
    /// is already registered. Check and insert happen in one statement.
    fn register_blob(
        &mut self,
        content_hash: &str,
        content_ref: &str,
        size_bytes: u64,
    ) -> StorageResult<bool>;

    // ===== Pages =====

    /// Inserts or replaces the record for `record.url`
    fn upsert_page(&mut self, record: &StoredRecord) -> StorageResult<()>;

    /// Gets the record for a URL
    fn get_page(&self, url: &str) -> StorageResult<Option<StoredRecord>>;

    /// Lists records, newest first, optionally restricted to one domain
    fn search_pages(
        &self,
        domain: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> StorageResult<Vec<StoredRecord>>;

    // ===== Link graph =====

    /// Records `source -> target` edges; returns how many were new
    fn insert_links(&mut self, source_url: &str, targets: &[String]) -> StorageResult<usize>;

    /// Gets the edges leaving a URL
    fn outgoing_links(&self, url: &str) -> StorageResult<Vec<LinkRecord>>;

    /// Gets the edges pointing at a URL
    fn incoming_links(&self, url: &str) -> StorageResult<Vec<LinkRecord>>;

    // ===== Statistics =====

    fn count_pages(&self) -> StorageResult<u64>;

    /// Number of stored pages whose content reused an existing blob
    fn count_duplicates(&self) -> StorageResult<u64>;

    /// Bytes held in distinct content blobs
    fn total_content_bytes(&self) -> StorageResult<u64>;

    fn count_links(&self) -> StorageResult<u64>;

    fn pages_by_domain(&self) -> StorageResult<HashMap<String, u64>>;

    fn pages_by_content_type(&self) -> StorageResult<HashMap<String, u64>>;

    /// Collects every statistic into one snapshot
    fn stats(&self) -> StorageResult<StorageStats> {
        Ok(StorageStats {
            total_pages: self.count_pages()?,
            duplicate_count: self.count_duplicates()?,
            total_bytes: self.total_content_bytes()?,
            total_links: self.count_links()?,
            per_domain_counts: self.pages_by_domain()?,
            per_content_type_counts: self.pages_by_content_type()?,
        })
    }
}
