//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{format_timestamp, parse_timestamp, LinkRecord, StoredRecord};
use crate::SumiError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const PAGE_COLUMNS: &str = "url, url_hash, domain, content_hash, title, meta_description, \
     meta_keywords, content_type, status_code, size_bytes, parent_url, depth, stored_at, \
     link_count, image_count, content_ref, metadata_ref, is_duplicate";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the page database at `path`
    pub fn new(path: &Path) -> Result<Self, SumiError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, SumiError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Runs `f` inside a transaction, committing only if it succeeds
    pub fn in_transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> StorageResult<T>,
    ) -> StorageResult<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    let stored_at: String = row.get(12)?;
    Ok(StoredRecord {
        url: row.get(0)?,
        url_hash: row.get(1)?,
        domain: row.get(2)?,
        content_hash: row.get(3)?,
        title: row.get(4)?,
        meta_description: row.get(5)?,
        meta_keywords: row.get(6)?,
        content_type: row.get(7)?,
        status_code: row.get::<_, i64>(8)? as u16,
        size_bytes: row.get::<_, i64>(9)? as u64,
        parent_url: row.get(10)?,
        depth: row.get::<_, i64>(11)? as u32,
        stored_at: parse_timestamp(&stored_at).unwrap_or_else(Utc::now),
        link_count: row.get::<_, i64>(13)? as u32,
        image_count: row.get::<_, i64>(14)? as u32,
        content_ref: row.get(15)?,
        metadata_ref: row.get(16)?,
        is_duplicate: row.get(17)?,
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_link_record(
    (source_url, target_url, discovered_at): (String, String, String),
) -> StorageResult<LinkRecord> {
    let discovered_at = parse_timestamp(&discovered_at).ok_or_else(|| StorageError::Corrupt {
        url: source_url.clone(),
        message: format!("bad timestamp '{}'", discovered_at),
    })?;
    Ok(LinkRecord {
        source_url,
        target_url,
        discovered_at,
    })
}

impl Storage for SqliteStorage {
    // ===== Content blobs =====

    fn register_blob(
        &mut self,
        content_hash: &str,
        content_ref: &str,
        size_bytes: u64,
    ) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO content_blobs (content_hash, content_ref, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                content_hash,
                content_ref,
                size_bytes as i64,
                format_timestamp(&Utc::now())
            ],
        )?;
        Ok(inserted == 1)
    }

    // ===== Pages =====

    fn upsert_page(&mut self, record: &StoredRecord) -> StorageResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO crawled_pages ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
                 ON CONFLICT(url) DO UPDATE SET
                    url_hash = excluded.url_hash,
                    domain = excluded.domain,
                    content_hash = excluded.content_hash,
                    title = excluded.title,
                    meta_description = excluded.meta_description,
                    meta_keywords = excluded.meta_keywords,
                    content_type = excluded.content_type,
                    status_code = excluded.status_code,
                    size_bytes = excluded.size_bytes,
                    parent_url = excluded.parent_url,
                    depth = excluded.depth,
                    stored_at = excluded.stored_at,
                    link_count = excluded.link_count,
                    image_count = excluded.image_count,
                    content_ref = excluded.content_ref,
                    metadata_ref = excluded.metadata_ref,
                    is_duplicate = excluded.is_duplicate",
                PAGE_COLUMNS
            ),
            params![
                record.url,
                record.url_hash,
                record.domain,
                record.content_hash,
                record.title,
                record.meta_description,
                record.meta_keywords,
                record.content_type,
                record.status_code as i64,
                record.size_bytes as i64,
                record.parent_url,
                record.depth as i64,
                format_timestamp(&record.stored_at),
                record.link_count as i64,
                record.image_count as i64,
                record.content_ref,
                record.metadata_ref,
                record.is_duplicate,
            ],
        )?;
        Ok(())
    }

    fn get_page(&self, url: &str) -> StorageResult<Option<StoredRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {} FROM crawled_pages WHERE url = ?1", PAGE_COLUMNS),
                params![url],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn search_pages(
        &self,
        domain: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> StorageResult<Vec<StoredRecord>> {
        let records = match domain {
            Some(domain) => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM crawled_pages WHERE domain = ?1
                     ORDER BY stored_at DESC, rowid DESC LIMIT ?2 OFFSET ?3",
                    PAGE_COLUMNS
                ))?;
                let rows = stmt.query_map(params![domain, limit, offset], row_to_record)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM crawled_pages
                     ORDER BY stored_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                    PAGE_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit, offset], row_to_record)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    // ===== Link graph =====

    fn insert_links(&mut self, source_url: &str, targets: &[String]) -> StorageResult<usize> {
        let now = format_timestamp(&Utc::now());
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO extracted_links (source_url, target_url, discovered_at)
             VALUES (?1, ?2, ?3)",
        )?;

        let mut inserted = 0;
        for target in targets {
            inserted += stmt.execute(params![source_url, target, now])?;
        }
        Ok(inserted)
    }

    fn outgoing_links(&self, url: &str) -> StorageResult<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_url, target_url, discovered_at FROM extracted_links
             WHERE source_url = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![url], row_to_link)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(to_link_record).collect()
    }

    fn incoming_links(&self, url: &str) -> StorageResult<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_url, target_url, discovered_at FROM extracted_links
             WHERE target_url = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![url], row_to_link)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(to_link_record).collect()
    }

    // ===== Statistics =====

    fn count_pages(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM crawled_pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_duplicates(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM crawled_pages WHERE is_duplicate = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn total_content_bytes(&self) -> StorageResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM content_blobs",
            [],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    fn count_links(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM extracted_links", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn pages_by_domain(&self) -> StorageResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT domain, COUNT(*) FROM crawled_pages GROUP BY domain")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    fn pages_by_content_type(&self) -> StorageResult<HashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_type, COUNT(*) FROM crawled_pages GROUP BY content_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(url: &str, domain: &str, content_hash: &str) -> StoredRecord {
        StoredRecord {
            url: url.to_string(),
            url_hash: crate::storage::url_hash(url),
            domain: domain.to_string(),
            content_hash: content_hash.to_string(),
            title: Some("Title".to_string()),
            meta_description: None,
            meta_keywords: None,
            content_type: "text/html".to_string(),
            status_code: 200,
            size_bytes: 42,
            parent_url: None,
            depth: 0,
            stored_at: Utc::now(),
            link_count: 3,
            image_count: 1,
            content_ref: format!("content/{}.html", content_hash),
            metadata_ref: format!("metadata/{}.json", crate::storage::url_hash(url)),
            is_duplicate: false,
        }
    }

    fn storage_with_blob(hash: &str) -> SqliteStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .register_blob(hash, &format!("content/{}.html", hash), 42)
            .unwrap();
        storage
    }

    #[test]
    fn test_register_blob_once() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.register_blob("abc", "content/abc.html", 10).unwrap());
        assert!(!storage.register_blob("abc", "content/abc.html", 10).unwrap());
        assert_eq!(storage.total_content_bytes().unwrap(), 10);
    }

    #[test]
    fn test_upsert_and_get_page() {
        let mut storage = storage_with_blob("h1");
        let rec = record("https://example.com/", "example.com", "h1");
        storage.upsert_page(&rec).unwrap();

        let loaded = storage.get_page("https://example.com/").unwrap().unwrap();
        assert_eq!(loaded.url, rec.url);
        assert_eq!(loaded.title.as_deref(), Some("Title"));
        assert_eq!(loaded.status_code, 200);
        assert_eq!(loaded.link_count, 3);
        assert!(!loaded.is_duplicate);

        assert!(storage.get_page("https://example.com/missing").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing_record() {
        let mut storage = storage_with_blob("h1");
        storage.register_blob("h2", "content/h2.html", 7).unwrap();

        storage
            .upsert_page(&record("https://example.com/", "example.com", "h1"))
            .unwrap();
        let mut updated = record("https://example.com/", "example.com", "h2");
        updated.title = Some("New".to_string());
        storage.upsert_page(&updated).unwrap();

        assert_eq!(storage.count_pages().unwrap(), 1);
        let loaded = storage.get_page("https://example.com/").unwrap().unwrap();
        assert_eq!(loaded.content_hash, "h2");
        assert_eq!(loaded.title.as_deref(), Some("New"));
    }

    #[test]
    fn test_search_orders_newest_first_and_filters_domain() {
        let mut storage = storage_with_blob("h1");
        let base = Utc::now();

        for (i, (url, domain)) in [
            ("https://a.com/1", "a.com"),
            ("https://b.com/1", "b.com"),
            ("https://a.com/2", "a.com"),
        ]
        .iter()
        .enumerate()
        {
            let mut rec = record(url, domain, "h1");
            rec.stored_at = base + Duration::seconds(i as i64);
            storage.upsert_page(&rec).unwrap();
        }

        let all = storage.search_pages(None, 10, 0).unwrap();
        let urls: Vec<&str> = all.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/2", "https://b.com/1", "https://a.com/1"]);

        let a_only = storage.search_pages(Some("a.com"), 10, 0).unwrap();
        assert_eq!(a_only.len(), 2);
        assert!(a_only.iter().all(|r| r.domain == "a.com"));

        let paged = storage.search_pages(None, 1, 1).unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].url, "https://b.com/1");
    }

    #[test]
    fn test_link_graph() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let targets = vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
        ];
        assert_eq!(
            storage.insert_links("https://example.com/", &targets).unwrap(),
            2
        );
        // Same edges again are ignored
        assert_eq!(
            storage.insert_links("https://example.com/", &targets).unwrap(),
            0
        );
        storage
            .insert_links("https://other.com/", &["https://example.com/a".to_string()])
            .unwrap();

        let out = storage.outgoing_links("https://example.com/").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].target_url, "https://example.com/a");

        let incoming = storage.incoming_links("https://example.com/a").unwrap();
        assert_eq!(incoming.len(), 2);
        assert_eq!(storage.count_links().unwrap(), 3);
    }

    #[test]
    fn test_stats() {
        let mut storage = storage_with_blob("h1");
        storage
            .upsert_page(&record("https://a.com/1", "a.com", "h1"))
            .unwrap();
        let mut dup = record("https://b.com/1", "b.com", "h1");
        dup.is_duplicate = true;
        dup.content_type = "application/xhtml+xml".to_string();
        storage.upsert_page(&dup).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_pages, 2);
        assert_eq!(stats.duplicate_count, 1);
        assert_eq!(stats.total_bytes, 42);
        assert_eq!(stats.per_domain_counts.get("a.com"), Some(&1));
        assert_eq!(stats.per_content_type_counts.get("text/html"), Some(&1));
        assert_eq!(
            stats.per_content_type_counts.get("application/xhtml+xml"),
            Some(&1)
        );
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result: StorageResult<()> = storage.in_transaction(|s| {
            s.register_blob("h1", "content/h1.html", 1)?;
            Err(StorageError::Corrupt {
                url: "x".to_string(),
                message: "forced".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(storage.total_content_bytes().unwrap(), 0);
    }
}
