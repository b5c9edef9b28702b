//! Durable log of frontier records
//!
//! Every URL the frontier admits gets one row, and every status change is
//! written through. Rows are never deleted during a run.

use crate::state::{UrlRecord, UrlStatus};
use crate::storage::schema::initialize_frontier_schema;
use crate::storage::traits::{StorageError, StorageResult};
use crate::storage::{format_timestamp, parse_timestamp};
use crate::SumiError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite-backed frontier persistence
pub struct FrontierLog {
    conn: Connection,
}

impl FrontierLog {
    /// Opens (or creates) the frontier database at `path`
    pub fn open(path: &Path) -> Result<Self, SumiError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        initialize_frontier_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory frontier log
    pub fn open_in_memory() -> Result<Self, SumiError> {
        let conn = Connection::open_in_memory()?;
        initialize_frontier_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Appends a record; an existing row for the same URL is left untouched
    pub fn insert(&mut self, record: &UrlRecord) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO url_queue
                (url, domain, depth, parent_url, priority, discovered_at, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.url,
                record.domain,
                record.depth as i64,
                record.parent_url,
                record.priority as i64,
                format_timestamp(&record.discovered_at),
                record.status.to_db_string(),
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Writes a status change through
    pub fn update_status(&mut self, url: &str, status: UrlStatus) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE url_queue SET status = ?1, updated_at = ?2 WHERE url = ?3",
            params![status.to_db_string(), format_timestamp(&Utc::now()), url],
        )?;
        Ok(())
    }

    pub fn get(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT url, domain, depth, parent_url, priority, discovered_at, status
                 FROM url_queue WHERE url = ?1",
                params![url],
                read_row,
            )
            .optional()?;
        raw.map(into_record).transpose()
    }

    /// Loads every record, oldest first
    pub fn load_all(&self) -> StorageResult<Vec<UrlRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, domain, depth, parent_url, priority, discovered_at, status
             FROM url_queue ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_record).collect()
    }

    pub fn count_by_status(&self) -> StorageResult<HashMap<UrlStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM url_queue GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(status, count)| UrlStatus::from_db_string(&status).map(|s| (s, count)))
            .collect())
    }

    /// Drops every record
    pub fn clear(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM url_queue", [])?;
        Ok(())
    }
}

type RawRow = (String, String, i64, Option<String>, i64, String, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_record(
    (url, domain, depth, parent_url, priority, discovered_at, status): RawRow,
) -> StorageResult<UrlRecord> {
    let status = UrlStatus::from_db_string(&status).ok_or_else(|| StorageError::Corrupt {
        url: url.clone(),
        message: format!("unknown status '{}'", status),
    })?;
    let discovered_at = parse_timestamp(&discovered_at).ok_or_else(|| StorageError::Corrupt {
        url: url.clone(),
        message: format!("bad timestamp '{}'", discovered_at),
    })?;

    Ok(UrlRecord {
        url,
        domain,
        depth: depth as u32,
        parent_url,
        priority: priority as u32,
        discovered_at,
        status,
    })
}
