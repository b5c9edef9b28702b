//! Console statistics
//!
//! Prints crawl snapshots and stored-page statistics to stdout.

use crate::crawler::CrawlSnapshot;
use crate::storage::StorageStats;
use std::collections::HashMap;

/// How many domains the per-domain listings show
const TOP_DOMAINS: usize = 20;

/// Sorts a count map by count (descending), then key
pub fn sorted_counts(counts: &HashMap<String, u64>) -> Vec<(&str, u64)> {
    let mut sorted: Vec<_> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    sorted
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Prints a full crawl snapshot
pub fn print_snapshot(snapshot: &CrawlSnapshot) {
    let crawl = &snapshot.crawl;
    println!("=== Crawl Statistics ===\n");

    println!("Crawl:");
    println!("  Runtime: {:.1}s", crawl.runtime.as_secs_f64());
    println!("  Pages attempted: {}", crawl.pages_attempted);
    println!(
        "  Pages crawled: {} ({:.2} pages/sec)",
        crawl.pages_crawled,
        crawl.pages_per_second()
    );
    println!("  Pages stored: {}", crawl.pages_stored);
    println!("  URLs discovered: {}", crawl.urls_discovered);
    println!("  Errors: {}", crawl.errors);
    println!("  Robots denied: {}", crawl.robots_denied);
    println!("  Filtered: {}", crawl.filtered);
    println!();

    let frontier = &snapshot.frontier;
    println!("Frontier:");
    println!("  URLs seen: {}", frontier.total_seen);
    println!("  Pending: {}", frontier.pending);
    println!("  In progress: {}", frontier.in_progress);
    println!("  Succeeded: {}", frontier.succeeded);
    println!("  Failed: {}", frontier.failed);
    if !frontier.queued_by_domain.is_empty() {
        println!("  Queued by domain:");
        for (domain, queued) in frontier.queued_by_domain.iter().take(TOP_DOMAINS) {
            println!("    {}: {}", domain, queued);
        }
    }
    println!();

    let fetcher = &snapshot.fetcher;
    println!("Fetcher:");
    println!("  Requests: {}", fetcher.total_requests);
    println!(
        "  Successful: {} ({:.1}%)",
        fetcher.successful_requests,
        fetcher.success_rate()
    );
    println!("  Failed: {}", fetcher.failed_requests);
    println!("  Bytes downloaded: {}", fetcher.bytes_downloaded);
    println!();

    let parser = &snapshot.parser;
    println!("Parser:");
    println!(
        "  Parsed: {} ({:.1}% clean, {} degraded)",
        parser.total_parsed,
        parser.success_rate(),
        parser.degraded
    );
    println!();

    let robots = &snapshot.robots;
    println!("Robots:");
    println!("  Domains cached: {}", robots.domains_cached);
    println!(
        "  Fetches: {} ({} failed)",
        robots.fetches, robots.fetch_failures
    );
    println!();

    match &snapshot.storage {
        Some(storage) => print_storage_stats(storage),
        None => println!("Storage: unavailable"),
    }
}

/// Prints statistics about stored pages
pub fn print_storage_stats(stats: &StorageStats) {
    println!("Storage:");
    println!("  Pages stored: {}", stats.total_pages);
    println!(
        "  Duplicates: {} ({:.1}%)",
        stats.duplicate_count,
        percentage(stats.duplicate_count, stats.total_pages)
    );
    println!("  Content bytes: {}", stats.total_bytes);
    println!("  Links recorded: {}", stats.total_links);

    if !stats.per_domain_counts.is_empty() {
        println!("  Pages by domain:");
        for (domain, count) in sorted_counts(&stats.per_domain_counts)
            .into_iter()
            .take(TOP_DOMAINS)
        {
            println!("    {}: {}", domain, count);
        }
    }

    if !stats.per_content_type_counts.is_empty() {
        println!("  Pages by content type:");
        for (content_type, count) in sorted_counts(&stats.per_content_type_counts) {
            println!("    {}: {}", content_type, count);
        }
    }
    println!();
}
