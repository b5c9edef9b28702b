use crate::config::types::{
    Config, CrawlerConfig, FetchConfig, FilterConfig, OutputConfig, PolitenessConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_crawler_config(&config.crawler)?;
    validate_filter_config(&config.filter)?;
    validate_politeness_config(&config.politeness)?;
    validate_fetch_config(&config.fetch)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates seed URLs (each must be an absolute http(s) URL)
pub fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-requests must be between 1 and 100, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1".to_string(),
        ));
    }

    if config.request_delay < 100 {
        return Err(ConfigError::Validation(format!(
            "request-delay must be >= 100ms, got {}ms",
            config.request_delay
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request-timeout must be >= 1s".to_string(),
        ));
    }

    if config.poll_interval < 1 {
        return Err(ConfigError::Validation(
            "poll-interval must be >= 1ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates link admission rules
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if let Some(allowed) = &config.allowed_domains {
        for pattern in allowed {
            validate_domain_pattern(pattern)?;
        }
    }

    for pattern in &config.blocked_domains {
        validate_domain_pattern(pattern)?;
    }

    // Shorter than "http://a.b" is never a usable limit
    if config.max_url_length < 10 {
        return Err(ConfigError::Validation(format!(
            "max-url-length must be >= 10, got {}",
            config.max_url_length
        )));
    }

    Ok(())
}

/// Validates crawler identity
fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    // The product token is what robots.txt groups are matched against
    if !config
        .user_agent
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return Err(ConfigError::Validation(format!(
            "user-agent must start with a product token, got '{}'",
            config.user_agent
        )));
    }

    if config.robots_cache_ttl < 1 {
        return Err(ConfigError::Validation(
            "robots-cache-ttl must be >= 1s".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetcher limits
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.allowed_content_types.is_empty() {
        return Err(ConfigError::Validation(
            "allowed-content-types cannot be empty".to_string(),
        ));
    }

    for content_type in &config.allowed_content_types {
        if !content_type.contains('/') {
            return Err(ConfigError::Validation(format!(
                "Invalid content type '{}'",
                content_type
            )));
        }
    }

    if config.max_file_size < 1 {
        return Err(ConfigError::Validation(
            "max-file-size must be >= 1".to_string(),
        ));
    }

    if config.max_connections < 1 || config.max_connections_per_host < 1 {
        return Err(ConfigError::Validation(
            "max-connections and max-connections-per-host must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.storage_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage-dir cannot be empty".to_string(),
        ));
    }

    if config.log_level.trim().is_empty() {
        return Err(ConfigError::Validation(
            "log-level cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    match pattern.strip_prefix("*.") {
        Some(domain) => validate_domain_string(domain),
        None => validate_domain_string(pattern),
    }
}

/// Validates a domain string (without wildcard prefix)
///
/// A trailing `:port` is accepted so that hosts such as `localhost:8080`
/// can be listed explicitly.
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    let host = match domain.rsplit_once(':') {
        Some((host, port)) => {
            if port.parse::<u16>().is_err() {
                return Err(ConfigError::InvalidPattern(format!(
                    "Domain '{}' has an invalid port",
                    domain
                )));
            }
            host
        }
        None => domain,
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !host
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if host.starts_with('.') || host.ends_with('.') || host.starts_with('-') || host.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if host.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
