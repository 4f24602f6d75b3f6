use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitemap_crawler::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Reduces a host to the form used for same-site comparison
///
/// A leading `www.` is not significant: `www.example.com` and `example.com`
/// serve the same site in practice.
pub fn site_key(host: &str) -> String {
    let lowered = host.to_lowercase();
    match lowered.strip_prefix("www.") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => lowered,
    }
}

/// Checks whether two hosts belong to the same site
pub fn same_site(a: &str, b: &str) -> bool {
    site_key(a) == site_key(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_host() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_with_port() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(extract_host(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_extract_mixed_case() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_site_key_strips_www() {
        assert_eq!(site_key("www.example.com"), "example.com");
        assert_eq!(site_key("WWW.Example.com"), "example.com");
        assert_eq!(site_key("blog.example.com"), "blog.example.com");
    }

    #[test]
    fn test_site_key_bare_www() {
        assert_eq!(site_key("www."), "www.");
    }

    #[test]
    fn test_same_site() {
        assert!(same_site("example.com", "www.example.com"));
        assert!(same_site("EXAMPLE.com", "example.COM"));
        assert!(!same_site("example.com", "blog.example.com"));
        assert!(!same_site("example.com", "example.org"));
        assert!(!same_site("example.com", "notexample.com"));
    }
}
