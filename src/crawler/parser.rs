//! HTML parser for extracting links and metadata
//!
//! This module handles parsing fetched HTML to extract:
//! - Page title (falling back to the first `<h1>`)
//! - Meta description and keywords
//! - Outbound links, normalized and passed through the [`LinkFilter`]
//! - Image sources
//!
//! Parsing never fails the crawl: when extraction cannot proceed the
//! document is passed on with every extracted field empty.

use crate::config::FilterConfig;
use crate::crawler::document::{FetchedDocument, ParsedDocument};
use crate::url::{resolve_and_normalize, LinkFilter};
use crate::FailureReason;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// Elements skipped by [`extract_main_content`]
const BOILERPLATE_SELECTORS: &[&str] = &[
    "script",
    "style",
    "nav",
    "footer",
    "header",
    ".advertisement",
    ".ads",
    ".sidebar",
    ".menu",
    ".navigation",
    ".breadcrumb",
    ".social-media",
];

/// Candidate main-content containers, most specific first
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    ".content",
    ".main-content",
    ".post-content",
    "#content",
    "#main-content",
    "#post-content",
];

/// Parser counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParserStats {
    pub total_parsed: u64,
    pub successful: u64,
    /// Documents passed on unparsed
    pub degraded: u64,
}

impl ParserStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_parsed == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_parsed as f64 * 100.0
        }
    }
}

/// Fields pulled out of one document
struct Extracted {
    title: Option<String>,
    meta_description: Option<String>,
    meta_keywords: Option<String>,
    outbound_links: Vec<String>,
    image_links: Vec<String>,
}

/// Extracts metadata and links from fetched documents
pub struct HtmlParser {
    filter: LinkFilter,
    total: AtomicU64,
    successful: AtomicU64,
    degraded: AtomicU64,
}

impl HtmlParser {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            filter: LinkFilter::new(config),
            total: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
        }
    }

    /// Parses a document, degrading to an unparsed document on failure
    pub fn parse(&self, doc: FetchedDocument) -> ParsedDocument {
        self.total.fetch_add(1, Ordering::Relaxed);
        match self.extract(&doc) {
            Ok(extracted) => {
                self.successful.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    "Parsed {}: {} links, {} images",
                    doc.url,
                    extracted.outbound_links.len(),
                    extracted.image_links.len()
                );
                ParsedDocument {
                    document: doc,
                    title: extracted.title,
                    meta_description: extracted.meta_description,
                    meta_keywords: extracted.meta_keywords,
                    outbound_links: extracted.outbound_links,
                    image_links: extracted.image_links,
                }
            }
            Err(e) => {
                self.degraded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Could not parse {}: {}", doc.url, e);
                ParsedDocument::unparsed(doc)
            }
        }
    }

    fn extract(&self, doc: &FetchedDocument) -> Result<Extracted, FailureReason> {
        let base = Url::parse(&doc.url)
            .map_err(|e| FailureReason::ParseDegraded(format!("bad document URL: {}", e)))?;
        let html = Html::parse_document(&doc.body);

        let title = match first_text(&html, "title")? {
            Some(title) => Some(title),
            None => first_text(&html, "h1")?,
        };
        let meta_description = match meta_content(&html, "meta[name=\"description\"]")? {
            Some(description) => Some(description),
            None => meta_content(&html, "meta[property=\"og:description\"]")?,
        };

        Ok(Extracted {
            title,
            meta_description,
            meta_keywords: meta_content(&html, "meta[name=\"keywords\"]")?,
            outbound_links: self.extract_links(&html, &base)?,
            image_links: extract_images(&html, &base)?,
        })
    }

    /// Admitted, normalized anchor targets in first-seen order
    fn extract_links(&self, html: &Html, base: &Url) -> Result<Vec<String>, FailureReason> {
        let anchors = selector("a[href]")?;
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in html.select(&anchors) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            if href.is_empty() || href.starts_with('#') {
                continue;
            }

            let Ok(url) = resolve_and_normalize(base, href) else {
                continue;
            };
            if let Err(reason) = self.filter.check(&url) {
                tracing::trace!("Skipping link {}: {}", url, reason);
                continue;
            }

            let url = url.to_string();
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }

        Ok(links)
    }

    pub fn stats(&self) -> ParserStats {
        ParserStats {
            total_parsed: self.total.load(Ordering::Relaxed),
            successful: self.successful.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
        }
    }
}

fn selector(css: &str) -> Result<Selector, FailureReason> {
    Selector::parse(css)
        .map_err(|e| FailureReason::ParseDegraded(format!("selector '{}': {:?}", css, e)))
}

/// Trimmed text of the first element matching `css`, if non-empty
fn first_text(html: &Html, css: &str) -> Result<Option<String>, FailureReason> {
    let selector = selector(css)?;
    Ok(html
        .select(&selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|text| !text.is_empty()))
}

fn meta_content(html: &Html, css: &str) -> Result<Option<String>, FailureReason> {
    let selector = selector(css)?;
    Ok(html
        .select(&selector)
        .find_map(|element| element.value().attr("content"))
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string))
}

/// Normalized `<img src>` targets, deduplicated, unfiltered
fn extract_images(html: &Html, base: &Url) -> Result<Vec<String>, FailureReason> {
    let images = selector("img[src]")?;
    let mut seen = HashSet::new();

    Ok(html
        .select(&images)
        .filter_map(|element| element.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .filter_map(|src| resolve_and_normalize(base, src).ok())
        .map(|url| url.to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts readable main text from an HTML page
///
/// Boilerplate (scripts, navigation, footers, ad and sidebar blocks) is
/// skipped. The text comes from the first main-content container found,
/// or from `<body>` when there is none.
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);
    let boilerplate: Vec<Selector> = BOILERPLATE_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .collect();

    let root = MAIN_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|selector| document.select(&selector).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|body| document.select(&body).next())
        });

    let Some(root) = root else {
        return String::new();
    };

    let mut text = String::new();
    collect_text(root, &boilerplate, &mut text);
    collapse_whitespace(&text)
}

fn collect_text(element: ElementRef<'_>, skip: &[Selector], out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child) = ElementRef::wrap(child) {
            if !skip.iter().any(|selector| selector.matches(&child)) {
                collect_text(child, skip, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn doc(body: &str) -> FetchedDocument {
        FetchedDocument {
            url: "https://example.com/page".to_string(),
            status_code: 200,
            content_type: "text/html".to_string(),
            body: body.to_string(),
            headers: BTreeMap::new(),
            size_bytes: body.len() as u64,
            parent_url: None,
            depth: 0,
            fetched_at: Utc::now(),
        }
    }

    fn parser() -> HtmlParser {
        HtmlParser::new(&FilterConfig::default())
    }

    #[test]
    fn test_extract_title() {
        let parsed = parser().parse(doc("<html><head><title>  Test Page  </title></head></html>"));
        assert_eq!(parsed.title.as_deref(), Some("Test Page"));
        assert_eq!(parsed.document.body, "<html><head><title>  Test Page  </title></head></html>");
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let parsed = parser().parse(doc("<html><body><h1>Heading</h1><h1>Second</h1></body></html>"));
        assert_eq!(parsed.title.as_deref(), Some("Heading"));

        let parsed = parser().parse(doc("<html><head><title> </title></head><body><h1>H</h1></body></html>"));
        assert_eq!(parsed.title.as_deref(), Some("H"));

        let parsed = parser().parse(doc("<html><body><p>nothing</p></body></html>"));
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_meta_description_and_keywords() {
        let html = r#"<html><head>
            <meta property="og:description" content="From OpenGraph">
            <meta name="description" content="Plain description">
            <meta name="keywords" content="rust, crawler">
        </head></html>"#;
        let parsed = parser().parse(doc(html));
        assert_eq!(parsed.meta_description.as_deref(), Some("Plain description"));
        assert_eq!(parsed.meta_keywords.as_deref(), Some("rust, crawler"));

        let html = r#"<html><head><meta property="og:description" content="From OpenGraph"></head></html>"#;
        let parsed = parser().parse(doc(html));
        assert_eq!(parsed.meta_description.as_deref(), Some("From OpenGraph"));
        assert_eq!(parsed.meta_keywords, None);
    }

    #[test]
    fn test_links_are_resolved_normalized_and_deduplicated() {
        let html = r##"<html><body>
            <a href="/b/">B</a>
            <a href="other">Relative</a>
            <a href="https://Other.com/x#frag">Other</a>
            <a href="/b">B again</a>
            <a href="#top">Fragment only</a>
            <a href="">Empty</a>
        </body></html>"##;
        let parsed = parser().parse(doc(html));
        assert_eq!(
            parsed.outbound_links,
            vec![
                "https://example.com/b",
                "https://example.com/other",
                "https://other.com/x",
            ]
        );
    }

    #[test]
    fn test_links_are_filtered() {
        let html = r#"<html><body>
            <a href="mailto:a@example.com">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a href="/report.PDF">PDF</a>
            <a href="https://blocked.com/">Blocked</a>
            <a href="/ok">OK</a>
        </body></html>"#;
        let parser = HtmlParser::new(&FilterConfig {
            blocked_domains: vec!["blocked.com".to_string()],
            ..FilterConfig::default()
        });
        let parsed = parser.parse(doc(html));
        assert_eq!(parsed.outbound_links, vec!["https://example.com/ok"]);
    }

    #[test]
    fn test_allowed_domains() {
        let html = r#"<a href="https://sub.example.com/">Sub</a><a href="https://else.org/">Else</a>"#;
        let parser = HtmlParser::new(&FilterConfig {
            allowed_domains: Some(vec!["*.example.com".to_string()]),
            ..FilterConfig::default()
        });
        let parsed = parser.parse(doc(html));
        assert_eq!(parsed.outbound_links, vec!["https://sub.example.com/"]);
    }

    #[test]
    fn test_images_are_not_filtered() {
        let html = r#"<img src="/logo.png"><img src="https://cdn.other.com/a.jpg"><img src="/logo.png">"#;
        let parser = HtmlParser::new(&FilterConfig {
            allowed_domains: Some(vec!["example.com".to_string()]),
            ..FilterConfig::default()
        });
        let parsed = parser.parse(doc(html));
        assert_eq!(
            parsed.image_links,
            vec!["https://example.com/logo.png", "https://cdn.other.com/a.jpg"]
        );
    }

    #[test]
    fn test_malformed_html_still_parses() {
        let parsed = parser().parse(doc(
            "<html><head><title>Broken</title><body><a href='/x'>x</div></p><p><b>unclosed",
        ));
        assert_eq!(parsed.outbound_links, vec!["https://example.com/x"]);
    }

    #[test]
    fn test_bad_document_url_degrades() {
        let parser = parser();
        let mut fetched = doc("<title>T</title><a href='/x'>x</a>");
        fetched.url = "not a url".to_string();

        let parsed = parser.parse(fetched.clone());
        assert_eq!(parsed, ParsedDocument::unparsed(fetched));

        let stats = parser.stats();
        assert_eq!(stats.total_parsed, 1);
        assert_eq!(stats.degraded, 1);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_extract_main_content() {
        let html = r#"<html><body>
            <nav>Home | About</nav>
            <div class="sidebar">Ads here</div>
            <article>
                <h2>Story</h2>
                <p>First   paragraph.</p>
                <script>var x = 1;</script>
                <div class="advertisement">Buy now</div>
                <p>Second paragraph.</p>
            </article>
            <footer>Copyright</footer>
        </body></html>"#;
        assert_eq!(
            extract_main_content(html),
            "Story First paragraph. Second paragraph."
        );
    }

    #[test]
    fn test_extract_main_content_falls_back_to_body() {
        let html = "<html><body><header>Top</header><p>Just text</p><style>p{}</style></body></html>";
        assert_eq!(extract_main_content(html), "Just text");
    }
}
