//! HTML parser for extracting page fields and links
//!
//! This module turns a fetched document into:
//! - The page title (or the "No Title" sentinel when the tag is missing)
//! - The meta description and first `<h1>`
//! - Every outbound link, resolved to an absolute URL
//!
//! Extraction never fails: unparsable markup simply yields default fields.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Title recorded when a parsed page has no `<title>`
pub const NO_TITLE: &str = "No Title";

/// Extracted information from an HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// Trimmed `<title>` text, or [`NO_TITLE`]
    pub title: String,

    /// `<meta name="description">` content, or empty
    pub meta_description: String,

    /// Text of the first `<h1>`, or empty
    pub h1: String,

    /// Absolute http(s) links in document order, without duplicates
    pub links: Vec<Url>,
}

/// Returns true if the content type names an HTML document
///
/// A missing header is treated as HTML; many small servers omit it.
pub fn is_html(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml"
        }
    }
}

/// Parses HTML content and extracts page fields and links
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags, resolved against `<base href>` when present,
///   otherwise against `base_url`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:`, `data:` links
/// - Fragment-only links (same page anchors)
/// - Anything that does not resolve to an http(s) URL
///
/// # Example
///
/// ```
/// use sitemap_crawler::crawler::extract;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let page = extract(html, &base_url);
/// assert_eq!(page.title, "Test");
/// assert_eq!(page.links[0].as_str(), "https://example.com/page");
/// ```
pub fn extract(html: &str, base_url: &Url) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = first_text(&document, "title")
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string());
    let meta_description = extract_meta_description(&document);
    let h1 = first_text(&document, "h1").unwrap_or_default();

    let base = document_base(&document, base_url);
    let links = extract_links(&document, &base);

    ExtractedPage {
        title,
        meta_description,
        h1,
        links,
    }
}

/// Collects the trimmed, whitespace-collapsed text of the first match
fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next().map(element_text)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_meta_description(document: &Html) -> String {
    let Ok(selector) = Selector::parse("meta[name][content]") else {
        return String::new();
    };

    document
        .select(&selector)
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("description"))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .unwrap_or_default()
}

/// Resolves the effective base URL, honouring `<base href>`
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let Ok(a_selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(absolute) = resolve_link(href, base_url) {
            if seen.insert(absolute.to_string()) {
                links.push(absolute);
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded. Resolution failures are
/// dropped silently.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}
