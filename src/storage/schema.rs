//! Database schema definitions
//!
//! Page metadata and the frontier live in separate SQLite files so that a
//! frontier can be discarded (`--fresh`) without touching stored pages.

/// SQL schema for the page metadata database
pub const SCHEMA_SQL: &str = r#"
-- One row per distinct body; the blob itself lives on disk
CREATE TABLE IF NOT EXISTS content_blobs (
    content_hash TEXT PRIMARY KEY,
    content_ref TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- One row per stored URL, replaced on re-crawl
CREATE TABLE IF NOT EXISTS crawled_pages (
    url TEXT PRIMARY KEY,
    url_hash TEXT NOT NULL,
    domain TEXT NOT NULL,
    content_hash TEXT NOT NULL REFERENCES content_blobs(content_hash),
    title TEXT,
    meta_description TEXT,
    meta_keywords TEXT,
    content_type TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL,
    parent_url TEXT,
    depth INTEGER NOT NULL,
    stored_at TEXT NOT NULL,
    link_count INTEGER NOT NULL,
    image_count INTEGER NOT NULL,
    content_ref TEXT NOT NULL,
    metadata_ref TEXT NOT NULL,
    is_duplicate INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pages_domain ON crawled_pages(domain);
CREATE INDEX IF NOT EXISTS idx_pages_content_hash ON crawled_pages(content_hash);
CREATE INDEX IF NOT EXISTS idx_pages_stored_at ON crawled_pages(stored_at);

-- Link graph, independent of whether the target was ever crawled
CREATE TABLE IF NOT EXISTS extracted_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_url TEXT NOT NULL,
    target_url TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    UNIQUE(source_url, target_url)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON extracted_links(source_url);
CREATE INDEX IF NOT EXISTS idx_links_target ON extracted_links(target_url);
"#;

/// SQL schema for the frontier database
pub const FRONTIER_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS url_queue (
    url TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    depth INTEGER NOT NULL,
    parent_url TEXT,
    priority INTEGER NOT NULL,
    discovered_at TEXT NOT NULL,
    status TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_url_queue_status ON url_queue(status);
CREATE INDEX IF NOT EXISTS idx_url_queue_domain ON url_queue(domain);
"#;

/// Initializes the page metadata schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}

/// Initializes the frontier schema
pub fn initialize_frontier_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(FRONTIER_SCHEMA_SQL)
}
