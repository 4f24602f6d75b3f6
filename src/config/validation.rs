use crate::config::types::{CrawlConfig, CrawlerConfig, ScreenshotConfig, UserAgentConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &CrawlConfig) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_screenshot_config(&config.screenshots, &config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates traversal limits
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_connections < 1 || config.max_connections > 100 {
        return Err(ConfigError::Validation(format!(
            "max-connections must be between 1 and 100, got {}",
            config.max_connections
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max-pages must be at least 1".to_string(),
        ));
    }

    if config.timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout-ms must be >= 100ms, got {}ms",
            config.timeout_ms
        )));
    }

    if config.crawl_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "crawl-timeout-secs must be at least 1".to_string(),
        ));
    }

    if config.link_budget_floor < 1 {
        return Err(ConfigError::Validation(
            "link-budget-floor must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates screenshot settings
fn validate_screenshot_config(
    config: &ScreenshotConfig,
    crawler: &CrawlerConfig,
) -> Result<(), ConfigError> {
    if config.quality < 1 || config.quality > 100 {
        return Err(ConfigError::Validation(format!(
            "screenshot quality must be between 1 and 100, got {}",
            config.quality
        )));
    }

    if config.max_concurrent < 1 {
        return Err(ConfigError::Validation(
            "screenshot max-concurrent must be at least 1".to_string(),
        ));
    }

    // Rendering is slower than a raw fetch; a shorter budget would starve it
    if config.timeout_ms < crawler.timeout_ms {
        return Err(ConfigError::Validation(format!(
            "screenshot timeout-ms ({}ms) must not be shorter than the fetch timeout ({}ms)",
            config.timeout_ms, crawler.timeout_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.value.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent value cannot be empty".to_string(),
        ));
    }

    if config.value.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(
            "user-agent value cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&CrawlConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_max_connections() {
        let mut config = CrawlConfig::default();
        config.crawler.max_connections = 0;
        assert!(validate(&config).is_err());

        config.crawler.max_connections = 101;
        assert!(validate(&config).is_err());

        config.crawler.max_connections = 100;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_max_pages() {
        let mut config = CrawlConfig::default();
        config.crawler.max_pages = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_request_timeout() {
        let mut config = CrawlConfig::default();
        config.crawler.timeout_ms = 50;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_quality_range() {
        let mut config = CrawlConfig::default();
        config.screenshots.quality = 0;
        assert!(validate(&config).is_err());

        config.screenshots.quality = 101;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_render_timeout_not_shorter_than_fetch() {
        let mut config = CrawlConfig::default();
        config.crawler.timeout_ms = 20_000;
        config.screenshots.timeout_ms = 10_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_user_agent() {
        let mut config = CrawlConfig::default();
        config.user_agent.value = "   ".to_string();
        assert!(validate(&config).is_err());

        config.user_agent.value = "bot\n1.0".to_string();
        assert!(validate(&config).is_err());
    }
}
