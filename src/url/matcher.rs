use crate::url::domain::host_part;

/// Checks if a domain matches a domain pattern
///
/// Patterns come in two shapes:
/// 1. Exact: "example.com" matches only "example.com"
/// 2. Wildcard: "*.example.com" matches "example.com" and every subdomain
///
/// A pattern with a `:port` suffix is compared against the full domain.
/// A pattern without one ignores the candidate's port, so "example.com"
/// also covers "example.com:8080".
///
/// # Examples
///
/// ```
/// use sumi_crawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(matches_wildcard("example.com", "example.com:8080"));
/// assert!(!matches_wildcard("example.com:8080", "example.com:9090"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let candidate = candidate.to_lowercase();

    let (base, wildcard) = match pattern.strip_prefix("*.") {
        Some(base) => (base, true),
        None => (pattern.as_str(), false),
    };

    let subject = if base.contains(':') {
        candidate.as_str()
    } else {
        host_part(&candidate)
    };

    if wildcard {
        subject == base || subject.ends_with(&format!(".{}", base))
    } else {
        subject == base
    }
}

/// Returns true if any pattern in `patterns` matches `candidate`
pub fn matches_any(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p, candidate))
}
