//! URL handling module
//!
//! This module provides URL normalization, domain extraction, domain pattern
//! matching and the link admission filter applied to discovered links.

mod domain;
mod filter;
mod matcher;
mod normalize;

pub use domain::{domain_of, extract_domain, host_part};
pub use filter::{LinkFilter, LinkRejection, BLOCKED_EXTENSIONS};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{normalize_url, resolve_and_normalize};
