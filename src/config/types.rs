use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for a crawl
///
/// Every table and key is optional; missing values fall back to the
/// defaults documented on each field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub crawler: CrawlerConfig,
    pub screenshots: ScreenshotConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Traversal limits and fetch policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum link depth from the seed page (default 3)
    pub max_depth: u32,

    /// Maximum number of pages admitted, seed included (default 100)
    pub max_pages: usize,

    /// Maximum number of in-flight requests (default 5)
    pub max_connections: usize,

    /// Per-request wall-clock budget in milliseconds (default 10000)
    pub timeout_ms: u64,

    /// Additional attempts after a transient failure (default 2)
    pub retries: u32,

    /// Minimum spacing between request dispatches in milliseconds (default 500)
    pub delay_ms: u64,

    /// Pause before a retry attempt in milliseconds (default 1000)
    pub retry_delay_ms: u64,

    /// Global crawl budget in seconds (default 1800)
    pub crawl_timeout_secs: u64,

    /// Grace period for in-flight work once the crawl stops (default 2000)
    pub settle_interval_ms: u64,

    /// Budget for the certificate lookup in milliseconds (default 5000)
    pub ssl_timeout_ms: u64,

    /// Link budget at depth 0 (default 50)
    pub link_budget_base: usize,

    /// Link budget reduction per depth level (default 10)
    pub link_budget_step: usize,

    /// Lower bound of the per-page link budget (default 10)
    pub link_budget_floor: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 100,
            max_connections: 5,
            timeout_ms: 10_000,
            retries: 2,
            delay_ms: 500,
            retry_delay_ms: 1_000,
            crawl_timeout_secs: 30 * 60,
            settle_interval_ms: 2_000,
            ssl_timeout_ms: 5_000,
            link_budget_base: 50,
            link_budget_step: 10,
            link_budget_floor: 10,
        }
    }
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl_timeout_secs)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn ssl_timeout(&self) -> Duration {
        Duration::from_millis(self.ssl_timeout_ms)
    }

    /// Number of new links a page at `depth` may admit
    ///
    /// Shallow pages get a wide budget, deep pages are clamped to the floor.
    pub fn link_budget(&self, depth: u32) -> usize {
        let reduction = self.link_budget_step.saturating_mul(depth as usize);
        self.link_budget_base
            .saturating_sub(reduction)
            .max(self.link_budget_floor)
    }
}

/// Screenshot capture settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScreenshotConfig {
    /// Whether to render and capture every page (default false)
    pub enabled: bool,

    /// Viewport preset (default desktop)
    pub viewport: Viewport,

    /// Image encoding (default png)
    pub format: ImageFormat,

    /// Encoder quality for lossy formats, 1-100 (default 80)
    pub quality: u8,

    /// Capture the whole scrollable page instead of the viewport (default true)
    pub full_page: bool,

    /// Render budget per page in milliseconds (default 30000)
    pub timeout_ms: u64,

    /// Maximum concurrent renders (default 2)
    pub max_concurrent: usize,

    /// Load-quiescence wait after navigation in milliseconds (default 500)
    pub settle_ms: u64,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            viewport: Viewport::Desktop,
            format: ImageFormat::Png,
            quality: 80,
            full_page: true,
            timeout_ms: 30_000,
            max_concurrent: 2,
            settle_ms: 500,
        }
    }
}

impl ScreenshotConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Browser viewport presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    Desktop,
    Tablet,
    Mobile,
}

impl Viewport {
    /// Returns (width, height) in CSS pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Desktop => (1920, 1080),
            Self::Tablet => (768, 1024),
            Self::Mobile => (375, 667),
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Mobile)
    }
}

/// Screenshot encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// File extension used for artifacts of this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    /// Whether the encoder honours a quality setting
    pub fn is_lossy(&self) -> bool {
        !matches!(self, Self::Png)
    }
}

/// User agent sent with every request
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    pub value: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            value: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                    (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}
