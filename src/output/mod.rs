//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Printing crawl and storage statistics to the console
//! - Generating markdown summaries of crawl results

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{print_snapshot, print_storage_stats};
