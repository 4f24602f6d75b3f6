use crate::UrlError;
use url::Url;

/// Normalizes an absolute URL for deduplication
///
/// # Normalization Steps
///
/// 1. Reject schemes other than http and https
/// 2. Reject URLs without a host
/// 3. Lowercase scheme and host (the parser already does this for http(s),
///    the explicit pass keeps hosts set through `set_host` consistent)
/// 4. Remove the fragment
///
/// Path, query and trailing slashes are preserved: `/docs` and `/docs/` are
/// different resources on many servers.
///
/// # Examples
///
/// ```
/// use sitemap_crawler::url::normalize_url;
/// use url::Url;
///
/// let url = Url::parse("HTTPS://Example.COM/Page#intro").unwrap();
/// assert_eq!(normalize_url(&url).unwrap().as_str(), "https://example.com/Page");
/// ```
pub fn normalize_url(url: &Url) -> Result<Url, UrlError> {
    let mut url = url.clone();

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    if host.chars().any(|c| c.is_ascii_uppercase()) {
        let lowered = host.to_ascii_lowercase();
        url.set_host(Some(&lowered))
            .map_err(|e| UrlError::Parse(e.to_string()))?;
    }

    url.set_fragment(None);
    Ok(url)
}

/// Parses and normalizes a URL string
pub fn parse_normalized(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_url(&url)
}
