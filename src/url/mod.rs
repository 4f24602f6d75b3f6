//! URL handling module for Sitemap-Crawler
//!
//! This module provides URL normalization, host extraction and the crawl
//! scope that decides which URLs belong to the site being mapped.

mod domain;
mod normalize;
mod scope;

pub use domain::{extract_host, same_site, site_key};
pub use normalize::{normalize_url, parse_normalized};
pub use scope::{is_asset_path, CrawlScope, ScopeViolation};

/// Returns the path used to order pages in reports
///
/// Falls back to the raw string when the URL cannot be parsed.
pub fn url_path(url_str: &str) -> String {
    ::url::Url::parse(url_str)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url_str.to_string())
}
