//! Markdown summary generation
//!
//! This module generates a human-readable markdown report of a crawl from a
//! [`CrawlSnapshot`].

use crate::crawler::CrawlSnapshot;
use crate::output::stats::sorted_counts;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::Path;

/// Writes the markdown summary of a crawl to `output_path`
pub fn generate_markdown_summary(
    snapshot: &CrawlSnapshot,
    config_hash: &str,
    output_path: &Path,
) -> io::Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let markdown = format_markdown_summary(snapshot, config_hash, Utc::now());
    fs::write(output_path, markdown)
}

/// Formats a crawl snapshot as markdown
pub fn format_markdown_summary(
    snapshot: &CrawlSnapshot,
    config_hash: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let crawl = &snapshot.crawl;
    let mut md = String::new();

    md.push_str("# Sumi-Crawl Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!(
        "- **Generated**: {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds\n",
        crawl.runtime.as_secs_f64()
    ));
    md.push_str(&format!("- **Config Hash**: {}\n\n", config_hash));

    md.push_str("## Crawl\n\n");
    md.push_str("| Metric | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Pages attempted | {} |\n", crawl.pages_attempted));
    md.push_str(&format!("| Pages crawled | {} |\n", crawl.pages_crawled));
    md.push_str(&format!("| Pages stored | {} |\n", crawl.pages_stored));
    md.push_str(&format!("| URLs discovered | {} |\n", crawl.urls_discovered));
    md.push_str(&format!("| Errors | {} |\n", crawl.errors));
    md.push_str(&format!("| Robots denied | {} |\n", crawl.robots_denied));
    md.push_str(&format!("| Filtered | {} |\n\n", crawl.filtered));
    md.push_str(&format!(
        "Throughput: {:.2} pages/sec\n\n",
        crawl.pages_per_second()
    ));

    let frontier = &snapshot.frontier;
    md.push_str("## Frontier\n\n");
    md.push_str("| Status | URLs |\n");
    md.push_str("|--------|------|\n");
    md.push_str(&format!("| pending | {} |\n", frontier.pending));
    md.push_str(&format!("| in_progress | {} |\n", frontier.in_progress));
    md.push_str(&format!("| success | {} |\n", frontier.succeeded));
    md.push_str(&format!("| failed | {} |\n\n", frontier.failed));

    let fetcher = &snapshot.fetcher;
    md.push_str("## Fetcher\n\n");
    md.push_str(&format!("- **Requests**: {}\n", fetcher.total_requests));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n",
        fetcher.success_rate()
    ));
    md.push_str(&format!(
        "- **Bytes Downloaded**: {}\n",
        fetcher.bytes_downloaded
    ));
    md.push_str(&format!(
        "- **Documents Parsed**: {} ({} degraded)\n",
        snapshot.parser.total_parsed, snapshot.parser.degraded
    ));
    md.push_str(&format!(
        "- **robots.txt Fetches**: {} ({} failed, {} domains)\n\n",
        snapshot.robots.fetches, snapshot.robots.fetch_failures, snapshot.robots.domains_cached
    ));

    if let Some(storage) = &snapshot.storage {
        md.push_str("## Storage\n\n");
        md.push_str(&format!("- **Pages**: {}\n", storage.total_pages));
        md.push_str(&format!("- **Duplicates**: {}\n", storage.duplicate_count));
        md.push_str(&format!("- **Content Bytes**: {}\n", storage.total_bytes));
        md.push_str(&format!("- **Links**: {}\n\n", storage.total_links));

        if !storage.per_domain_counts.is_empty() {
            md.push_str("### Pages by Domain\n\n");
            md.push_str("| Domain | Pages |\n");
            md.push_str("|--------|-------|\n");
            let domains = sorted_counts(&storage.per_domain_counts);
            for (domain, count) in domains.iter().take(50) {
                md.push_str(&format!("| {} | {} |\n", domain, count));
            }
            if domains.len() > 50 {
                md.push_str(&format!("\n... and {} more\n", domains.len() - 50));
            }
            md.push('\n');
        }

        if !storage.per_content_type_counts.is_empty() {
            md.push_str("### Pages by Content Type\n\n");
            md.push_str("| Content Type | Pages |\n");
            md.push_str("|--------------|-------|\n");
            for (content_type, count) in sorted_counts(&storage.per_content_type_counts) {
                md.push_str(&format!("| {} | {} |\n", content_type, count));
            }
            md.push('\n');
        }
    }

    md
}
