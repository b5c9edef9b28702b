//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching
//! robots.txt files. Fetch failures never block crawling: anything other
//! than a readable 200 response is treated as "no restrictions".

mod cache;
mod parser;

pub use cache::{DomainPolicy, RobotsCache, RobotsStats};
pub use parser::{product_token, ParsedRobots};
