//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier: deduplicated, politeness-scheduled URL queues
//! - HTTP fetching with content-type and size limits
//! - HTML parsing and link extraction
//! - Overall crawl coordination

mod coordinator;
mod document;
mod fetcher;
mod frontier;
mod parser;

pub use coordinator::{Coordinator, CrawlSnapshot, CrawlStats};
pub use document::{FetchedDocument, ParsedDocument};
pub use fetcher::{build_http_client, decode_body, FetchResult, Fetcher, FetcherStats};
pub use frontier::{Frontier, FrontierStats};
pub use parser::{extract_main_content, HtmlParser, ParserStats};
