//! Link admission rules
//!
//! Decides whether a discovered (already normalized) link may enter the
//! frontier at all. Depth and dedup are the frontier's business; this only
//! looks at the URL itself.

use crate::config::FilterConfig;
use crate::url::domain::extract_domain;
use crate::url::matcher::matches_any;
use thiserror::Error;
use url::Url;

/// Path suffixes that never lead to an HTML document
pub const BLOCKED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".tar", ".gz",
    ".7z", ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg", ".mp3", ".mp4", ".avi",
    ".mkv", ".mov", ".wmv", ".flv", ".css", ".js", ".ico", ".xml", ".json",
];

/// Why a link was not admitted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkRejection {
    #[error("Unsupported scheme: {0}")]
    Scheme(String),

    #[error("URL longer than {0} bytes")]
    TooLong(usize),

    #[error("Non-HTML resource: {0}")]
    BlockedExtension(String),

    #[error("URL has no domain")]
    MissingDomain,

    #[error("Domain is blocked: {0}")]
    BlockedDomain(String),

    #[error("Domain is not in the allow list: {0}")]
    NotAllowed(String),
}

/// Link admission filter built from the `[filter]` configuration
#[derive(Debug, Clone)]
pub struct LinkFilter {
    allowed_domains: Option<Vec<String>>,
    blocked_domains: Vec<String>,
    max_url_length: usize,
}

impl LinkFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            allowed_domains: config.allowed_domains.clone(),
            blocked_domains: config.blocked_domains.clone(),
            max_url_length: config.max_url_length,
        }
    }

    /// Checks a normalized URL against every admission rule, in order:
    /// scheme, length, extension, blocked domains, allowed domains.
    pub fn check(&self, url: &Url) -> Result<(), LinkRejection> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LinkRejection::Scheme(url.scheme().to_string()));
        }

        if url.as_str().len() > self.max_url_length {
            return Err(LinkRejection::TooLong(self.max_url_length));
        }

        let path = url.path().to_lowercase();
        if let Some(ext) = BLOCKED_EXTENSIONS.iter().find(|ext| path.ends_with(*ext)) {
            return Err(LinkRejection::BlockedExtension(ext.to_string()));
        }

        let domain = extract_domain(url).ok_or(LinkRejection::MissingDomain)?;

        if matches_any(&self.blocked_domains, &domain) {
            return Err(LinkRejection::BlockedDomain(domain));
        }

        if let Some(allowed) = &self.allowed_domains {
            if !matches_any(allowed, &domain) {
                return Err(LinkRejection::NotAllowed(domain));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(allowed: Option<Vec<&str>>, blocked: Vec<&str>) -> LinkFilter {
        LinkFilter::new(&FilterConfig {
            allowed_domains: allowed.map(|a| a.into_iter().map(String::from).collect()),
            blocked_domains: blocked.into_iter().map(String::from).collect(),
            max_url_length: 60,
        })
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_plain_link_admitted() {
        let f = filter(None, vec![]);
        assert!(f.check(&url("https://example.com/page")).is_ok());
        assert!(f.check(&url("http://example.com/")).is_ok());
    }

    #[test]
    fn test_scheme_rejected() {
        let f = filter(None, vec![]);
        assert_eq!(
            f.check(&url("ftp://example.com/file")),
            Err(LinkRejection::Scheme("ftp".to_string()))
        );
    }

    #[test]
    fn test_length_cap() {
        let f = filter(None, vec![]);
        let long = format!("https://example.com/{}", "a".repeat(60));
        assert_eq!(f.check(&url(&long)), Err(LinkRejection::TooLong(60)));
    }

    #[test]
    fn test_blocked_extensions() {
        let f = filter(None, vec![]);
        for path in ["/report.PDF", "/logo.png", "/app.js", "/feed.xml", "/a.tar.gz"] {
            let u = url(&format!("https://example.com{}", path));
            assert!(
                matches!(f.check(&u), Err(LinkRejection::BlockedExtension(_))),
                "{} should be rejected",
                path
            );
        }
        assert!(f.check(&url("https://example.com/page.html")).is_ok());
        assert!(f.check(&url("https://example.com/jsdocs")).is_ok());
    }

    #[test]
    fn test_blocked_domain() {
        let f = filter(None, vec!["*.ads.net"]);
        assert_eq!(
            f.check(&url("https://x.ads.net/")),
            Err(LinkRejection::BlockedDomain("x.ads.net".to_string()))
        );
        assert!(f.check(&url("https://example.com/")).is_ok());
    }

    #[test]
    fn test_allow_list() {
        let f = filter(Some(vec!["example.com"]), vec![]);
        assert!(f.check(&url("https://example.com/a")).is_ok());
        assert_eq!(
            f.check(&url("https://other.com/a")),
            Err(LinkRejection::NotAllowed("other.com".to_string()))
        );
    }

    #[test]
    fn test_block_wins_over_allow() {
        let f = filter(Some(vec!["*.example.com"]), vec!["private.example.com"]);
        assert!(f.check(&url("https://www.example.com/")).is_ok());
        assert!(f.check(&url("https://private.example.com/")).is_err());
    }
}
