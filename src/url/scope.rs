use crate::url::domain::{extract_host, site_key};
use url::Url;

/// File extensions that never lead to crawlable pages
const ASSET_EXTENSIONS: &[&str] = &[
    // documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
    // images
    "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "ico", "tif", "tiff", "avif",
    // archives
    "zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz",
    // executables and installers
    "exe", "dmg", "msi", "pkg", "deb", "rpm", "apk", "bin", "iso",
    // styles and scripts
    "css", "js", "mjs", "map",
    // media and fonts
    "mp3", "mp4", "avi", "mov", "wav", "webm", "woff", "woff2", "ttf", "otf", "eot",
];

/// Why a URL falls outside the crawl scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeViolation {
    /// Host differs from the seed's site
    OffSite,
    /// Path does not start with the seed's base path
    OutsideBasePath,
    /// Path names a binary or static asset
    Asset,
}

/// The part of a site a crawl may visit
///
/// Derived once from the seed URL: the seed's site key (host without `www.`)
/// and its base path, the seed path up to and including its last `/`.
/// A crawl rooted at `/docs/` never leaves `/docs/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlScope {
    site: String,
    base_path: String,
}

impl CrawlScope {
    /// Builds the scope for a seed URL
    ///
    /// # Examples
    ///
    /// ```
    /// use sitemap_crawler::url::CrawlScope;
    /// use url::Url;
    ///
    /// let scope = CrawlScope::from_seed(&Url::parse("https://example.com/docs/intro").unwrap());
    /// assert_eq!(scope.base_path(), "/docs/");
    /// ```
    pub fn from_seed(seed: &Url) -> Self {
        let site = extract_host(seed)
            .map(|host| site_key(&host))
            .unwrap_or_default();

        let path = seed.path();
        let base_path = match path.rfind('/') {
            Some(idx) => path[..=idx].to_string(),
            None => "/".to_string(),
        };

        Self { site, base_path }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Checks a normalized URL against host, base path and asset rules
    pub fn check(&self, url: &Url) -> Result<(), ScopeViolation> {
        let host = extract_host(url).ok_or(ScopeViolation::OffSite)?;
        if site_key(&host) != self.site {
            return Err(ScopeViolation::OffSite);
        }

        if !url.path().starts_with(&self.base_path) {
            return Err(ScopeViolation::OutsideBasePath);
        }

        if is_asset_path(url.path()) {
            return Err(ScopeViolation::Asset);
        }

        Ok(())
    }

    /// Convenience wrapper around [`CrawlScope::check`]
    pub fn contains(&self, url: &Url) -> bool {
        self.check(url).is_ok()
    }
}

/// Returns true if the final path segment carries a denylisted extension
pub fn is_asset_path(path: &str) -> bool {
    let segment = path.rsplit('/').next().unwrap_or("");
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            ASSET_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}
