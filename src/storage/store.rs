//! Deduplicating page store
//!
//! Combines the SQLite metadata backend with the on-disk blob store. The
//! whole check-register-write sequence for one document runs under a single
//! lock and a single transaction, so two workers storing the same new body
//! concurrently still produce exactly one blob.

use crate::crawler::ParsedDocument;
use crate::storage::blobs::BlobStore;
use crate::storage::sqlite::SqliteStorage;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{content_hash, url_hash, LinkRecord, StorageStats, StoredRecord};
use crate::url::domain_of;
use crate::SumiError;
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Content-addressed document store
pub struct PageStore {
    db: Mutex<SqliteStorage>,
    blobs: BlobStore,
    /// Duplicates seen by this instance
    session_duplicates: AtomicU64,
}

impl PageStore {
    /// Opens the store: blobs under `storage_dir`, metadata in `database_path`
    pub fn open(storage_dir: &Path, database_path: &Path) -> Result<Self, SumiError> {
        let blobs = BlobStore::open(storage_dir)?;
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = SqliteStorage::new(database_path)?;
        Ok(Self::with_parts(db, blobs))
    }

    /// Opens a store whose metadata lives in memory (blobs still go to disk)
    pub fn open_in_memory(storage_dir: &Path) -> Result<Self, SumiError> {
        let blobs = BlobStore::open(storage_dir)?;
        let db = SqliteStorage::new_in_memory()?;
        Ok(Self::with_parts(db, blobs))
    }

    fn with_parts(db: SqliteStorage, blobs: BlobStore) -> Self {
        Self {
            db: Mutex::new(db),
            blobs,
            session_duplicates: AtomicU64::new(0),
        }
    }

    fn db(&self) -> MutexGuard<'_, SqliteStorage> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a parsed document; errors are logged and reported as `false`
    pub fn store(&self, doc: &ParsedDocument) -> bool {
        match self.store_record(doc) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Failed to store {}: {}", doc.document.url, e);
                false
            }
        }
    }

    /// Stores a parsed document and returns the record that was written
    pub fn store_record(&self, doc: &ParsedDocument) -> StorageResult<StoredRecord> {
        let page = &doc.document;
        let body = page.body.as_bytes();
        let url_hash = url_hash(&page.url);
        let content_hash = content_hash(body);
        let content_ref = BlobStore::content_ref(&content_hash);

        let mut db = self.db();
        let record = db.in_transaction(|db| {
            let is_new = db.register_blob(&content_hash, &content_ref, body.len() as u64)?;
            if is_new {
                self.blobs.write_content(&content_hash, body)?;
            }

            let record = StoredRecord {
                url: page.url.clone(),
                url_hash: url_hash.clone(),
                domain: domain_of(&page.url).unwrap_or_default(),
                content_hash: content_hash.clone(),
                title: doc.title.clone(),
                meta_description: doc.meta_description.clone(),
                meta_keywords: doc.meta_keywords.clone(),
                content_type: page.content_type.clone(),
                status_code: page.status_code,
                size_bytes: page.size_bytes,
                parent_url: page.parent_url.clone(),
                depth: page.depth,
                stored_at: Utc::now(),
                link_count: doc.outbound_links.len() as u32,
                image_count: doc.image_links.len() as u32,
                content_ref: content_ref.clone(),
                metadata_ref: BlobStore::metadata_ref(&url_hash),
                is_duplicate: !is_new,
            };

            self.blobs.write_metadata(&record)?;
            db.upsert_page(&record)?;
            db.insert_links(&record.url, &doc.outbound_links)?;
            Ok(record)
        })?;
        drop(db);

        if record.is_duplicate {
            self.session_duplicates.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Content of {} duplicates blob {}",
                record.url,
                record.content_hash
            );
        }

        Ok(record)
    }

    pub fn get(&self, url: &str) -> StorageResult<Option<StoredRecord>> {
        self.db().get_page(url)
    }

    /// Lists stored records, newest first
    pub fn search(
        &self,
        domain: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> StorageResult<Vec<StoredRecord>> {
        self.db().search_pages(domain, limit, offset)
    }

    pub fn stats(&self) -> StorageResult<StorageStats> {
        self.db().stats()
    }

    pub fn outgoing_links(&self, url: &str) -> StorageResult<Vec<LinkRecord>> {
        self.db().outgoing_links(url)
    }

    pub fn incoming_links(&self, url: &str) -> StorageResult<Vec<LinkRecord>> {
        self.db().incoming_links(url)
    }

    /// Reads back the body a record points at
    pub fn read_content(&self, record: &StoredRecord) -> StorageResult<String> {
        Ok(self.blobs.read_content(&record.content_ref)?)
    }

    /// Reads back the JSON metadata sidecar of a record
    pub fn read_metadata(&self, record: &StoredRecord) -> StorageResult<StoredRecord> {
        self.blobs.read_metadata(&record.metadata_ref)
    }

    pub fn session_duplicates(&self) -> u64 {
        self.session_duplicates.load(Ordering::Relaxed)
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }
}
