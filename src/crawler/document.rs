//! Documents flowing through the pipeline
//!
//! A [`FetchedDocument`] is produced by the fetcher and consumed by the
//! parser; a [`ParsedDocument`] is handed to storage. Neither outlives one
//! processing step.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A successfully fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
    pub url: String,
    pub status_code: u16,
    /// MIME type without parameters, lowercased (e.g. "text/html")
    pub content_type: String,
    /// Body decoded with the declared charset
    pub body: String,
    /// Response headers, lowercased names
    pub headers: BTreeMap<String, String>,
    /// Raw body size on the wire, before decoding
    pub size_bytes: u64,
    pub parent_url: Option<String>,
    pub depth: u32,
    pub fetched_at: DateTime<Utc>,
}

/// A fetched page plus everything the parser extracted from it
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub document: FetchedDocument,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
    /// Admitted, normalized outbound links in first-seen order
    pub outbound_links: Vec<String>,
    /// Normalized image sources in first-seen order
    pub image_links: Vec<String>,
}

impl ParsedDocument {
    /// Wraps a document with every extraction field empty
    ///
    /// This is what a degraded parse returns.
    pub fn unparsed(document: FetchedDocument) -> Self {
        Self {
            document,
            title: None,
            meta_description: None,
            meta_keywords: None,
            outbound_links: Vec::new(),
            image_links: Vec::new(),
        }
    }
}
