//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties everything together:
//! - Looking up certificate metadata for https seeds
//! - Dispatching frontier entries to the fetch pool
//! - Extracting pages and feeding their links back into the frontier
//! - Spawning screenshot captures on their own track
//! - Detecting drain, timeout and stop, then finalizing artifacts
//!
//! The coordinator is the single owner of the result set. Fetch and capture
//! tasks only return values; every record is written here.

use crate::config::{validate, CrawlConfig};
use crate::crawler::capture::{
    finalize_artifacts, ArtifactStore, CaptureOptions, CaptureService, ChromeBackend,
    RenderBackend,
};
use crate::crawler::fetcher::{FetchOutcome, FetchPool, FetchedDocument};
use crate::crawler::frontier::{Admission, Frontier, FrontierEntry};
use crate::crawler::parser::{extract, is_html};
use crate::crawler::progress::{crawling_percentage, ProgressChannel, ProgressEvent};
use crate::crawler::record::{CrawlResult, PageRecord, PageStatus, ScreenshotRef, Termination};
use crate::crawler::ssl::{certificate_host, CertificateInspector, SslInfo, TlsInspector};
use crate::state::{CrawlPhase, CrawlState};
use crate::url::{parse_normalized, CrawlScope};
use crate::{CrawlError, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use url::Url;

/// Cloneable handle that asks a running crawl to stop
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Requests a stop; in-flight work gets the settle interval to finish
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    seed: Url,
    config: CrawlConfig,
    progress: ProgressChannel,
    render_backend: Arc<dyn RenderBackend>,
    inspector: Arc<dyn CertificateInspector>,
    stop: Arc<watch::Sender<bool>>,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `seed` - The start URL; must be http or https
    /// * `config` - The crawl configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(CrawlError)` - Invalid seed or configuration
    pub fn new(seed: &str, config: CrawlConfig) -> Result<Self> {
        validate(&config)?;
        let seed = parse_normalized(seed)?;
        let (stop, _) = watch::channel(false);

        Ok(Self {
            inspector: Arc::new(TlsInspector::new(config.crawler.ssl_timeout())),
            seed,
            config,
            progress: ProgressChannel::default(),
            render_backend: Arc::new(ChromeBackend),
            stop: Arc::new(stop),
        })
    }

    /// Publishes progress on an existing channel
    pub fn with_progress(mut self, progress: ProgressChannel) -> Self {
        self.progress = progress;
        self
    }

    /// Replaces the headless browser used for screenshots
    pub fn with_render_backend(mut self, backend: Arc<dyn RenderBackend>) -> Self {
        self.render_backend = backend;
        self
    }

    /// Replaces the certificate lookup used for https seeds
    pub fn with_certificate_inspector(mut self, inspector: Arc<dyn CertificateInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    pub fn progress(&self) -> &ProgressChannel {
        &self.progress
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sender: Arc::clone(&self.stop),
        }
    }

    /// Runs the crawl to a terminal state
    ///
    /// Page, capture and certificate failures are recorded in the result.
    /// Only setup failures (HTTP client, scratch directory) return an error.
    pub async fn run(self) -> Result<CrawlResult> {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.config.crawler.crawl_timeout();
        let mut state = CrawlState::new();

        tracing::info!("Starting crawl of {}", self.seed);
        self.progress.publish(ProgressEvent::new(
            CrawlPhase::Initializing,
            format!("Initializing crawl of {}", self.seed),
        ));

        let scope = CrawlScope::from_seed(&self.seed);
        let pool = Arc::new(FetchPool::new(&self.config, &scope)?);
        let mut store = if self.config.screenshots.enabled {
            ArtifactStore::create().map_err(CrawlError::Scratch)?
        } else {
            ArtifactStore::empty()
        };
        let capture = store.path().map(|dir| {
            Arc::new(CaptureService::new(
                Arc::clone(&self.render_backend),
                &self.config.screenshots,
                dir.to_path_buf(),
            ))
        });

        let ssl = if self.seed.scheme() == "https" {
            state.advance(CrawlPhase::SslCheck)?;
            self.progress.publish(ProgressEvent::new(
                CrawlPhase::SslCheck,
                "Retrieving SSL certificate information",
            ));
            Some(self.inspect_certificate().await)
        } else {
            None
        };

        state.advance(CrawlPhase::StartingCrawler)?;
        let frontier = Frontier::new(scope, self.config.crawler.max_pages);
        frontier.seed(&self.seed);
        self.progress.publish(
            ProgressEvent::new(CrawlPhase::StartingCrawler, "Crawler started")
                .with_page(self.seed.as_str(), 0)
                .with_counts(0, frontier.queue_len()),
        );

        let mut run = CrawlRun {
            config: &self.config,
            progress: &self.progress,
            state,
            frontier,
            pool,
            capture,
            pages: Vec::new(),
            fetches: JoinSet::new(),
            captures: JoinSet::new(),
            pending_captures: HashSet::new(),
        };

        let outcome = run.crawl(deadline, self.stop.subscribe()).await;
        run.shutdown_capture().await;
        let termination = outcome?;

        let CrawlRun {
            mut pages, state, ..
        } = run;

        let options = CaptureOptions::from_config(&self.config.screenshots);
        let screenshot_artifacts = finalize_artifacts(&mut pages, &store, &options);
        if screenshot_artifacts.is_empty() {
            if let Err(e) = store.cleanup() {
                tracing::warn!("Failed to remove scratch directory: {}", e);
            }
        }

        let message = match termination {
            Termination::Drained => format!("Crawl completed: {} pages", pages.len()),
            Termination::TimedOut => format!("Crawl timed out: {} pages collected", pages.len()),
            Termination::Stopped => format!("Crawl stopped: {} pages collected", pages.len()),
        };
        tracing::info!("{}", message);
        self.progress.publish(
            ProgressEvent::new(state.phase(), message).with_counts(pages.len(), 0),
        );

        Ok(CrawlResult {
            seed: self.seed.to_string(),
            pages,
            screenshot_artifacts,
            ssl,
            is_complete: true,
            termination,
            started_at,
            finished_at: Utc::now(),
            artifacts: store,
        })
    }

    async fn inspect_certificate(&self) -> SslInfo {
        let host = certificate_host(&self.seed).unwrap_or_default();
        let port = self.seed.port_or_known_default().unwrap_or(443);
        let info = self.inspector.inspect(&host, port).await;
        tracing::info!("SSL issuer for {}: {} ({:?})", host, info.issuer, info.status);
        info
    }
}

/// Mutable state of one crawl invocation
struct CrawlRun<'a> {
    config: &'a CrawlConfig,
    progress: &'a ProgressChannel,
    state: CrawlState,
    frontier: Frontier,
    pool: Arc<FetchPool>,
    capture: Option<Arc<CaptureService>>,
    pages: Vec<PageRecord>,
    fetches: JoinSet<(FrontierEntry, FetchOutcome)>,
    captures: JoinSet<(usize, ScreenshotRef)>,
    pending_captures: HashSet<usize>,
}

impl CrawlRun<'_> {
    /// Main loop: dispatch, collect, repeat until drained, timed out or stopped
    async fn crawl(
        &mut self,
        deadline: Instant,
        mut stop: watch::Receiver<bool>,
    ) -> Result<Termination> {
        loop {
            if *stop.borrow() {
                return self.terminate(CrawlPhase::Stopped).await;
            }
            if Instant::now() >= deadline {
                return self.terminate(CrawlPhase::TimedOut).await;
            }

            self.dispatch();
            if self.fetches.is_empty() && self.frontier.is_empty() {
                break;
            }

            tokio::select! {
                Some(joined) = self.fetches.join_next() => match joined {
                    Ok((entry, outcome)) => self.record_fetch(entry, outcome, true)?,
                    Err(e) => tracing::error!("Fetch task failed: {}", e),
                },
                Some(joined) = self.captures.join_next() => self.record_capture(joined),
                _ = tokio::time::sleep_until(deadline) => {
                    return self.terminate(CrawlPhase::TimedOut).await;
                }
                Ok(()) = stop.changed() => {}
            }
        }

        self.state.advance(CrawlPhase::Draining)?;
        self.progress.publish(
            ProgressEvent::new(
                CrawlPhase::Draining,
                format!("Waiting for {} screenshots", self.captures.len()),
            )
            .with_counts(self.pages.len(), 0),
        );

        while !self.captures.is_empty() {
            if *stop.borrow() {
                return self.terminate(CrawlPhase::Stopped).await;
            }
            tokio::select! {
                Some(joined) = self.captures.join_next() => self.record_capture(joined),
                _ = tokio::time::sleep_until(deadline) => {
                    return self.terminate(CrawlPhase::TimedOut).await;
                }
                Ok(()) = stop.changed() => {}
            }
        }

        self.state.advance(CrawlPhase::Completed)?;
        Ok(Termination::Drained)
    }

    /// Fills free fetch slots from the frontier
    fn dispatch(&mut self) {
        while self.fetches.len() < self.pool.capacity() {
            let Some(entry) = self.frontier.dequeue() else {
                break;
            };

            tracing::debug!("Dispatching {} (depth {})", entry.url, entry.depth);
            let pool = Arc::clone(&self.pool);
            self.fetches.spawn(async move {
                let outcome = pool.fetch(&entry.url).await;
                (entry, outcome)
            });
        }
    }

    /// Closes admission and gives in-flight work the settle interval
    ///
    /// Fetches that finish in time are recorded without following their
    /// links; whatever is still running afterwards is aborted.
    async fn terminate(&mut self, phase: CrawlPhase) -> Result<Termination> {
        let dropped = self.frontier.close();
        self.pool.close();
        self.state.advance(phase)?;

        tracing::info!(
            "Crawl {}: {} pages recorded, {} queued URLs dropped, {} fetches in flight",
            phase,
            self.pages.len(),
            dropped,
            self.fetches.len()
        );

        let grace = Instant::now() + self.config.crawler.settle_interval();
        while !(self.fetches.is_empty() && self.captures.is_empty()) {
            tokio::select! {
                Some(joined) = self.fetches.join_next() => match joined {
                    Ok((entry, outcome)) => self.record_fetch(entry, outcome, false)?,
                    Err(e) => tracing::error!("Fetch task failed: {}", e),
                },
                Some(joined) = self.captures.join_next() => self.record_capture(joined),
                _ = tokio::time::sleep_until(grace) => break,
            }
        }

        self.fetches.abort_all();
        while self.fetches.join_next().await.is_some() {}
        self.captures.abort_all();
        while let Some(joined) = self.captures.join_next().await {
            self.record_capture(joined);
        }

        for index in self.pending_captures.drain() {
            if let Some(page) = self.pages.get_mut(index) {
                page.screenshot = Some(ScreenshotRef::Interrupted);
            }
        }

        Ok(match phase {
            CrawlPhase::Stopped => Termination::Stopped,
            _ => Termination::TimedOut,
        })
    }

    /// Turns a finished fetch into a page record
    ///
    /// With `follow` set, links are admitted and a capture is spawned.
    fn record_fetch(
        &mut self,
        entry: FrontierEntry,
        outcome: FetchOutcome,
        follow: bool,
    ) -> Result<()> {
        let (page, links) = match outcome {
            FetchOutcome::Fetched(doc) => page_from_document(&entry, doc),
            FetchOutcome::Failed { attempts: 0, .. } => return Ok(()),
            FetchOutcome::Failed { error, attempts } => {
                tracing::warn!("Failed to fetch {}: {}", entry.url, error);
                (
                    PageRecord::failed(entry.url.as_str(), entry.depth, error, attempts),
                    Vec::new(),
                )
            }
        };

        // A 3xx here is a redirect that left the crawl scope
        let renderable = page.status.code().is_some_and(|code| (200..300).contains(&code))
            && is_html(page.content_type.as_deref());
        let status = page.status;

        self.pages.push(page);
        let index = self.pages.len() - 1;

        if self.state.phase().is_active() {
            self.state.advance(CrawlPhase::Crawling)?;
        }

        if follow {
            let admitted = self.admit_links(&entry, &links);
            if admitted > 0 {
                tracing::debug!("{} new links admitted from {}", admitted, entry.url);
            }
            if renderable {
                self.spawn_capture(index, entry.url.clone());
            }
        }

        let pages = self.pages.len();
        self.progress.publish(
            ProgressEvent::new(CrawlPhase::Crawling, format!("Crawled {} ({})", entry.url, status))
                .with_percentage(crawling_percentage(pages, self.config.crawler.max_pages))
                .with_page(entry.url.as_str(), entry.depth)
                .with_counts(pages, self.frontier.queue_len()),
        );
        Ok(())
    }

    /// Admits a page's links, bounded by depth, page cap and link budget
    fn admit_links(&self, entry: &FrontierEntry, links: &[Url]) -> usize {
        let crawler = &self.config.crawler;
        if links.is_empty()
            || entry.depth >= crawler.max_depth
            || self.pages.len() >= crawler.max_pages
        {
            return 0;
        }

        let budget = crawler.link_budget(entry.depth);
        let mut admitted = 0;
        for link in links {
            if admitted >= budget {
                tracing::debug!("Link budget of {} reached on {}", budget, entry.url);
                break;
            }
            match self.frontier.try_admit(link, entry.depth + 1) {
                Admission::Admitted => admitted += 1,
                Admission::PageCapReached | Admission::Closed => break,
                rejected => tracing::debug!("Skipping {}: {:?}", link, rejected),
            }
        }
        admitted
    }

    fn spawn_capture(&mut self, index: usize, url: Url) {
        let Some(capture) = &self.capture else {
            return;
        };

        let capture = Arc::clone(capture);
        self.pending_captures.insert(index);
        self.captures.spawn(async move {
            let shot = capture.capture(&url).await;
            (index, shot)
        });
    }

    fn record_capture(
        &mut self,
        joined: std::result::Result<(usize, ScreenshotRef), tokio::task::JoinError>,
    ) {
        match joined {
            Ok((index, shot)) => {
                self.pending_captures.remove(&index);
                if let Some(page) = self.pages.get_mut(index) {
                    page.screenshot = Some(shot);
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!("Capture task failed: {}", e),
        }
    }

    /// Stops the browser; later calls are no-ops
    async fn shutdown_capture(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.shutdown().await;
        }
    }
}

/// Builds the record and candidate links for a response
fn page_from_document(entry: &FrontierEntry, doc: FetchedDocument) -> (PageRecord, Vec<Url>) {
    let mut page = PageRecord {
        url: entry.url.to_string(),
        title: String::new(),
        meta_description: String::new(),
        h1: String::new(),
        depth: entry.depth,
        status: PageStatus::Code(doc.status),
        content_type: doc.meta.content_type,
        last_modified: doc.meta.last_modified,
        content_length: doc.meta.content_length,
        error: None,
        attempts: doc.attempts,
        screenshot: None,
    };

    if !is_html(page.content_type.as_deref()) {
        return (page, Vec::new());
    }

    let extracted = extract(&doc.body, &doc.final_url);
    page.title = extracted.title;
    page.meta_description = extracted.meta_description;
    page.h1 = extracted.h1;

    // Error pages are recorded but their links are not followed
    let links = if doc.status < 400 {
        extracted.links
    } else {
        Vec::new()
    };
    (page, links)
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Validate the configuration and seed
/// 2. Look up certificate metadata for https seeds
/// 3. Fetch pages breadth-first within the site
/// 4. Optionally capture a screenshot of every page
/// 5. Return the collected records when the crawl ends
///
/// # Arguments
///
/// * `seed` - The start URL
/// * `config` - The crawl configuration
/// * `progress` - Channel the crawl publishes progress events on
pub async fn run_crawl(
    seed: &str,
    config: CrawlConfig,
    progress: ProgressChannel,
) -> Result<CrawlResult> {
    Coordinator::new(seed, config)?
        .with_progress(progress)
        .run()
        .await
}
