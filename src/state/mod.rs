//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlStatus`: lifecycle of a frontier URL (pending, in progress, success, failed)
//! - `UrlRecord`: a URL known to the frontier, with depth and priority
//! - `DomainState`: per-domain queue and politeness window

mod domain_state;
mod url_record;
mod url_status;

pub use domain_state::{DomainState, QueuedUrl};
pub use url_record::{priority_for_depth, UrlRecord, SEED_PRIORITY};
pub use url_status::UrlStatus;
