//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run full crawls
//! end-to-end. Screenshots go through an in-process render backend so no
//! browser is needed.

use async_trait::async_trait;
use sitemap_crawler::config::CrawlConfig;
use sitemap_crawler::crawler::{
    CaptureError, CaptureOptions, CertificateInspector, Coordinator, PageStatus,
    ProgressChannel, RenderBackend, RenderSession, ScreenshotRef, SslInfo, SslStatus,
    Termination,
};
use sitemap_crawler::{run_crawl, CrawlPhase};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fast settings: no pacing, no retry pause, short timeouts
fn test_config() -> CrawlConfig {
    let mut config = CrawlConfig::default();
    config.crawler.delay_ms = 0;
    config.crawler.retry_delay_ms = 0;
    config.crawler.timeout_ms = 1000;
    config.crawler.settle_interval_ms = 200;
    config
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

fn page_with_links(title: &str, links: &[String]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
        title, title, anchors
    )
}

async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test]
async fn test_page_cap_and_depth_limit() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..10).map(|i| format!("/p{}", i)).collect();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Home", &links)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html(page_with_links("Child", &["deep/one".to_string()])))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.max_depth = 1;
    config.crawler.max_pages = 5;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .expect("crawl failed");

    assert_eq!(result.pages.len(), 5);
    assert!(result.pages.iter().all(|p| p.depth <= 1));
    assert_eq!(result.pages.iter().filter(|p| p.depth == 0).count(), 1);
    assert_eq!(result.termination, Termination::Drained);

    let paths = requested_paths(&server).await;
    assert_eq!(paths.len(), 5);
    assert!(paths.iter().all(|p| !p.contains("deep")));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Recovered", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.retries = 2;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 1);
    let page = &result.pages[0];
    assert_eq!(page.status, PageStatus::Code(200));
    assert_eq!(page.title, "Recovered");
    assert_eq!(page.h1, "Recovered");
    assert_eq!(page.attempts, 3);
}

#[tokio::test]
async fn test_persistent_server_error_keeps_last_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503).set_body_raw("<title>Down</title>", "text/html"))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.retries = 1;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].status, PageStatus::Code(503));
    assert_eq!(result.pages[0].title, "Down");
}

#[tokio::test]
async fn test_timeout_produces_single_error_record() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<title>Slow</title>").set_delay(Duration::from_secs(2)))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.timeout_ms = 200;
    config.crawler.retries = 2;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 1);
    let page = &result.pages[0];
    assert_eq!(page.status, PageStatus::Error);
    assert_eq!(page.title, "");
    assert_eq!(page.attempts, 3);
    assert!(page.error.is_some());
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Home", &["/missing".to_string()])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.retries = 3;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .unwrap();

    let missing = result
        .pages
        .iter()
        .find(|p| p.url.ends_with("/missing"))
        .expect("404 page recorded");
    assert_eq!(missing.status, PageStatus::Code(404));
    assert_eq!(missing.attempts, 1);
}

#[tokio::test]
async fn test_scope_is_enforced() {
    let server = MockServer::start().await;
    let port = Url::parse(&server.uri()).unwrap().port().unwrap();

    Mock::given(method("GET"))
        .and(path("/docs/"))
        .respond_with(html(page_with_links(
            "Docs",
            &[
                "/docs/guide".to_string(),
                "/blog/post".to_string(),
                "/docs/manual.pdf".to_string(),
                "/docs/logo.PNG".to_string(),
                format!("http://localhost:{}/docs/offsite", port),
                "https://other.example/docs/".to_string(),
            ],
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(page_with_links("Any", &[])))
        .mount(&server)
        .await;

    let result = run_crawl(
        &format!("{}/docs/", server.uri()),
        test_config(),
        ProgressChannel::default(),
    )
    .await
    .unwrap();

    let mut paths = requested_paths(&server).await;
    paths.sort();
    assert_eq!(paths, vec!["/docs/", "/docs/guide"]);
    assert_eq!(result.pages.len(), 2);
}

#[tokio::test]
async fn test_redirects_never_leave_scope() {
    let site = MockServer::start().await;
    let other = MockServer::start().await;
    let other_port = Url::parse(&other.uri()).unwrap().port().unwrap();

    Mock::given(method("GET"))
        .and(path("/docs/"))
        .respond_with(html(page_with_links(
            "Docs",
            &[
                "/docs/jump".to_string(),
                "/docs/up".to_string(),
                "/docs/moved".to_string(),
            ],
        )))
        .mount(&site)
        .await;
    // Different host, same base path
    let outside = format!("http://localhost:{}/docs/elsewhere", other_port);
    Mock::given(method("GET"))
        .and(path("/docs/jump"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", outside.as_str()))
        .mount(&site)
        .await;
    // Same host, outside the base path
    Mock::given(method("GET"))
        .and(path("/docs/up"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/private"))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/moved"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/docs/new-home"))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/new-home"))
        .respond_with(html(page_with_links("New Home", &[])))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(html(page_with_links("Private", &[])))
        .expect(0)
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .respond_with(html(page_with_links("Outside", &[])))
        .expect(0)
        .mount(&other)
        .await;

    let result = run_crawl(
        &format!("{}/docs/", site.uri()),
        test_config(),
        ProgressChannel::default(),
    )
    .await
    .unwrap();

    assert!(requested_paths(&other).await.is_empty());
    assert!(!requested_paths(&site).await.contains(&"/private".to_string()));

    let page = |suffix: &str| {
        result
            .pages
            .iter()
            .find(|p| p.url.ends_with(suffix))
            .expect("page recorded")
    };
    assert_eq!(page("/docs/jump").status, PageStatus::Code(302));
    assert_ne!(page("/docs/jump").title, "Outside");
    assert_eq!(page("/docs/up").status, PageStatus::Code(302));
    assert_ne!(page("/docs/up").title, "Private");
    assert_eq!(page("/docs/moved").status, PageStatus::Code(200));
    assert_eq!(page("/docs/moved").title, "New Home");
}

#[tokio::test]
async fn test_shared_links_fetched_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links(
            "Home",
            &["/a".to_string(), "/b".to_string(), "/a#top".to_string()],
        )))
        .mount(&server)
        .await;
    for name in ["a", "b"] {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(html(page_with_links(
                name,
                &[
                    "/".to_string(),
                    "/a".to_string(),
                    "/b".to_string(),
                    "/shared".to_string(),
                ],
            )))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(html(page_with_links("Shared", &["/".to_string()])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.max_connections = 4;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .unwrap();

    let urls: HashSet<&str> = result.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls.len(), result.pages.len());
    assert_eq!(result.pages.len(), 4);

    let paths = requested_paths(&server).await;
    let unique: HashSet<&String> = paths.iter().collect();
    assert_eq!(unique.len(), paths.len());
}

#[tokio::test]
async fn test_link_budget_limits_admissions() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..30).map(|i| format!("/item{}", i)).collect();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Home", &links)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/item\d+$"))
        .respond_with(html(page_with_links("Item", &[])))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.max_depth = 1;
    config.crawler.link_budget_base = 5;
    config.crawler.link_budget_step = 1;
    config.crawler.link_budget_floor = 2;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .unwrap();

    // Seed plus the depth-0 budget of 5
    assert_eq!(result.pages.len(), 6);
    let mut children: Vec<&str> = result
        .pages
        .iter()
        .filter(|p| p.depth == 1)
        .map(|p| p.url.rsplit('/').next().unwrap())
        .collect();
    children.sort();
    assert_eq!(children, vec!["item0", "item1", "item2", "item3", "item4"]);
}

#[tokio::test]
async fn test_screenshots_disabled_produces_no_artifacts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Home", &["/a".to_string()])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(page_with_links("A", &[])))
        .mount(&server)
        .await;

    let result = run_crawl(
        &format!("{}/", server.uri()),
        test_config(),
        ProgressChannel::default(),
    )
    .await
    .unwrap();

    assert_eq!(result.pages.len(), 2);
    assert!(result.pages.iter().all(|p| p.screenshot.is_none()));
    assert!(result.screenshot_artifacts.is_empty());
    assert!(result.artifact_dir().is_none());
}

#[tokio::test]
async fn test_global_timeout_returns_partial_result() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..20).map(|i| format!("/slow{}", i)).collect();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Home", &links)).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/slow\d+$"))
        .respond_with(html(page_with_links("Slow", &[])).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.max_connections = 1;
    config.crawler.crawl_timeout_secs = 1;
    config.crawler.settle_interval_ms = 50;

    let result = run_crawl(&format!("{}/", server.uri()), config, ProgressChannel::default())
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::TimedOut);
    assert!(result.is_complete);
    assert!(!result.pages.is_empty());
    assert!(result.pages.len() < 21);

    // Nothing goes out after the cutoff
    let at_return = requested_paths(&server).await.len();
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(requested_paths(&server).await.len(), at_return);
}

#[tokio::test]
async fn test_stop_signal_returns_partial_result() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..20).map(|i| format!("/n{}", i)).collect();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Home", &links)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/n\d+$"))
        .respond_with(html(page_with_links("Node", &[])).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.crawler.max_connections = 1;

    let progress = ProgressChannel::default();
    let coordinator = Coordinator::new(&format!("{}/", server.uri()), config)
        .unwrap()
        .with_progress(progress.clone());
    let stop = coordinator.stop_handle();

    let mut events = progress.subscribe();
    tokio::spawn(async move {
        let mut crawled = 0;
        while let Ok(event) = events.recv().await {
            if event.phase == CrawlPhase::Crawling {
                crawled += 1;
                if crawled == 3 {
                    stop.stop();
                    break;
                }
            }
        }
    });

    let result = coordinator.run().await.unwrap();
    assert_eq!(result.termination, Termination::Stopped);
    assert!(result.pages.len() >= 3);
    assert!(result.pages.len() < 21);
}

#[tokio::test]
async fn test_stop_before_start_fetches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html(page_with_links("Home", &[])))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(&format!("{}/", server.uri()), test_config()).unwrap();
    coordinator.stop_handle().stop();

    let result = coordinator.run().await.unwrap();
    assert_eq!(result.termination, Termination::Stopped);
    assert!(result.pages.is_empty());
}

#[tokio::test]
async fn test_progress_events_cover_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links("Home", &["/a".to_string()])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(page_with_links("A", &[])))
        .mount(&server)
        .await;

    let progress = ProgressChannel::default();
    let mut events = progress.subscribe();
    let result = run_crawl(&format!("{}/", server.uri()), test_config(), progress)
        .await
        .unwrap();
    assert_eq!(result.pages.len(), 2);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    let phases: Vec<CrawlPhase> = received.iter().map(|e| e.phase).collect();
    assert_eq!(phases.first(), Some(&CrawlPhase::Initializing));
    assert!(phases.contains(&CrawlPhase::StartingCrawler));
    assert!(!phases.contains(&CrawlPhase::SslCheck));
    assert_eq!(phases.iter().filter(|p| **p == CrawlPhase::Crawling).count(), 2);
    assert!(phases.contains(&CrawlPhase::Draining));

    let last = received.last().unwrap();
    assert_eq!(last.phase, CrawlPhase::Completed);
    assert_eq!(last.percentage, 100);

    let crawling: Vec<u8> = received
        .iter()
        .filter(|e| e.phase == CrawlPhase::Crawling)
        .map(|e| e.percentage)
        .collect();
    assert!(crawling.windows(2).all(|w| w[0] <= w[1]));
    assert!(crawling.iter().all(|p| (10..=90).contains(p)));
}

struct FixedInspector;

#[async_trait]
impl CertificateInspector for FixedInspector {
    async fn inspect(&self, _host: &str, _port: u16) -> SslInfo {
        let mut info = SslInfo::failure(SslStatus::Ok);
        info.issuer = "Test CA".to_string();
        info.subject = "example.test".to_string();
        info
    }
}

#[tokio::test]
async fn test_certificate_lookup_only_for_https() {
    // Nothing listens on port 1, so the page itself fails
    let mut config = test_config();
    config.crawler.retries = 0;
    config.crawler.timeout_ms = 300;

    let result = Coordinator::new("https://127.0.0.1:1/", config.clone())
        .unwrap()
        .with_certificate_inspector(Arc::new(FixedInspector))
        .run()
        .await
        .unwrap();
    let ssl = result.ssl.as_ref().expect("ssl metadata for https seed");
    assert_eq!(ssl.issuer, "Test CA");
    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].status, PageStatus::Error);

    let result = Coordinator::new("http://127.0.0.1:1/", config)
        .unwrap()
        .with_certificate_inspector(Arc::new(FixedInspector))
        .run()
        .await
        .unwrap();
    assert!(result.ssl.is_none());
}

/// Render backend that writes the page URL into the image file
#[derive(Default)]
struct FakeBrowser {
    fail_launch: bool,
    launches: AtomicU32,
    shutdowns: Arc<AtomicU32>,
}

struct FakeTab {
    shutdowns: Arc<AtomicU32>,
}

#[async_trait]
impl RenderBackend for FakeBrowser {
    async fn launch(&self) -> Result<Arc<dyn RenderSession>, CaptureError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(CaptureError::BrowserUnavailable("not installed".into()));
        }
        Ok(Arc::new(FakeTab {
            shutdowns: Arc::clone(&self.shutdowns),
        }))
    }
}

#[async_trait]
impl RenderSession for FakeTab {
    async fn capture(
        &self,
        url: &Url,
        _options: &CaptureOptions,
        path: &Path,
    ) -> Result<(), CaptureError> {
        std::fs::write(path, url.as_str())?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

async fn mount_small_site(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(page_with_links(
            "Home",
            &["/zeta".to_string(), "/alpha".to_string()],
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(alpha|zeta)$"))
        .respond_with(html(page_with_links("Leaf", &[])))
        .mount(server)
        .await;
}

fn screenshot_config() -> CrawlConfig {
    let mut config = test_config();
    config.screenshots.enabled = true;
    config.screenshots.settle_ms = 0;
    config.screenshots.timeout_ms = 5000;
    config
}

#[tokio::test]
async fn test_screenshots_named_by_path_order() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let browser = Arc::new(FakeBrowser::default());
    let mut result = Coordinator::new(&format!("{}/", server.uri()), screenshot_config())
        .unwrap()
        .with_render_backend(browser.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(browser.launches.load(Ordering::SeqCst), 1);
    assert_eq!(browser.shutdowns.load(Ordering::SeqCst), 1);

    let artifacts = &result.screenshot_artifacts;
    assert_eq!(artifacts.len(), 3);

    let mut by_position: Vec<_> = artifacts.iter().collect();
    by_position.sort_by_key(|a| a.position);
    let names: Vec<String> = by_position
        .iter()
        .map(|a| a.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["001.png", "002.png", "003.png"]);
    assert!(by_position[0].url.ends_with('/'));
    assert!(by_position[1].url.ends_with("/alpha"));
    assert!(by_position[2].url.ends_with("/zeta"));

    for artifact in artifacts {
        assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), artifact.url);
        let page = result.pages.iter().find(|p| p.url == artifact.url).unwrap();
        assert_eq!(
            page.screenshot,
            Some(ScreenshotRef::Saved {
                path: artifact.path.clone()
            })
        );
    }

    let dir = result.artifact_dir().unwrap().to_path_buf();
    result.cleanup().unwrap();
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_unavailable_browser_does_not_abort_crawl() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let browser = Arc::new(FakeBrowser {
        fail_launch: true,
        ..FakeBrowser::default()
    });
    let result = Coordinator::new(&format!("{}/", server.uri()), screenshot_config())
        .unwrap()
        .with_render_backend(browser.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(result.pages.len(), 3);
    assert!(result
        .pages
        .iter()
        .all(|p| p.screenshot == Some(ScreenshotRef::BrowserUnavailable)));
    assert!(browser.launches.load(Ordering::SeqCst) <= 3);
    assert_eq!(browser.shutdowns.load(Ordering::SeqCst), 0);
    assert!(result.screenshot_artifacts.is_empty());
    assert!(result.artifact_dir().is_none());
}
