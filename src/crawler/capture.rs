//! Headless render capture
//!
//! One browser process is started lazily on the first capture and shared by
//! every capture of the crawl. Each capture runs in its own browser context
//! so cookies and storage never leak between pages. Captures have their own
//! concurrency limit and timeout, independent of the fetch pool.
//!
//! Files are written under provisional names into a per-crawl scratch
//! directory and renamed to their final `NNN.<ext>` names once the crawl has
//! ended and the page order is known.

use crate::config::{ImageFormat, ScreenshotConfig, Viewport};
use crate::crawler::record::{sort_by_path, ArtifactDescriptor, PageRecord, ScreenshotRef};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use url::Url;

/// Consecutive launch failures after which screenshots are disabled
pub const MAX_LAUNCH_FAILURES: u32 = 3;

/// Errors from the render engine
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rendering parameters shared by every capture of a crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub viewport: Viewport,
    pub format: ImageFormat,
    pub quality: u8,
    pub full_page: bool,
    pub settle: Duration,
}

impl CaptureOptions {
    pub fn from_config(config: &ScreenshotConfig) -> Self {
        Self {
            viewport: config.viewport,
            format: config.format,
            quality: config.quality,
            full_page: config.full_page,
            settle: config.settle(),
        }
    }
}

/// Starts render sessions
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn RenderSession>, CaptureError>;
}

/// A running render engine
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Renders `url` in an isolated context and writes the image to `path`
    async fn capture(
        &self,
        url: &Url,
        options: &CaptureOptions,
        path: &Path,
    ) -> Result<(), CaptureError>;

    /// Stops the engine; called at most once
    async fn shutdown(&self);
}

/// Headless Chromium via the DevTools protocol
#[derive(Debug, Clone, Default)]
pub struct ChromeBackend;

#[async_trait]
impl RenderBackend for ChromeBackend {
    async fn launch(&self) -> Result<Arc<dyn RenderSession>, CaptureError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .build()
            .map_err(CaptureError::BrowserUnavailable)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CaptureError::BrowserUnavailable(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error: {}", e);
                }
            }
        });

        tracing::info!("Headless browser started");
        Ok(Arc::new(ChromeSession {
            browser,
            handler: Mutex::new(Some(handler_task)),
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromeSession {
    async fn render(
        &self,
        page: &chromiumoxide::Page,
        url: &Url,
        options: &CaptureOptions,
        path: &Path,
    ) -> Result<(), CaptureError> {
        let (width, height) = options.viewport.dimensions();
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(width),
            i64::from(height),
            1.0,
            options.viewport.is_mobile(),
        ))
        .await
        .map_err(|e| CaptureError::Capture(e.to_string()))?;

        page.goto(url.as_str())
            .await
            .map_err(|e| CaptureError::Navigation(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| CaptureError::Navigation(e.to_string()))?;

        if !options.settle.is_zero() {
            tokio::time::sleep(options.settle).await;
        }

        let mut params = ScreenshotParams::builder()
            .format(screenshot_format(options.format))
            .full_page(options.full_page);
        if options.format.is_lossy() {
            params = params.quality(i64::from(options.quality));
        }

        page.save_screenshot(params.build(), path)
            .await
            .map_err(|e| CaptureError::Capture(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn capture(
        &self,
        url: &Url,
        options: &CaptureOptions,
        path: &Path,
    ) -> Result<(), CaptureError> {
        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| CaptureError::Capture(e.to_string()))?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(CaptureError::Capture)?;

        let result = match self.browser.new_page(target).await {
            Ok(page) => {
                let result = self.render(&page, url, options, path).await;
                if let Err(e) = page.close().await {
                    tracing::debug!("Failed to close page for {}: {}", url, e);
                }
                result
            }
            Err(e) => Err(CaptureError::Capture(e.to_string())),
        };

        if let Err(e) = self
            .browser
            .execute(DisposeBrowserContextParams::new(context_id))
            .await
        {
            tracing::debug!("Failed to dispose browser context: {}", e);
        }

        result
    }

    async fn shutdown(&self) {
        if let Err(e) = self.browser.execute(CloseParams::default()).await {
            tracing::debug!("Browser close command failed: {}", e);
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        tracing::info!("Headless browser stopped");
    }
}

fn screenshot_format(format: ImageFormat) -> CaptureScreenshotFormat {
    match format {
        ImageFormat::Png => CaptureScreenshotFormat::Png,
        ImageFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        ImageFormat::Webp => CaptureScreenshotFormat::Webp,
    }
}

/// Owner of the scratch directory holding screenshot files
///
/// Dropping the store deletes the directory.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    dir: Option<TempDir>,
}

impl ArtifactStore {
    pub fn empty() -> Self {
        Self { dir: None }
    }

    /// Creates a fresh scratch directory in the system temp location
    pub fn create() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("sitemap-crawler-")
            .tempdir()?;
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Detaches the directory so it outlives the store
    pub fn persist(&mut self) -> Option<PathBuf> {
        self.dir.take().map(TempDir::keep)
    }

    /// Removes the directory now rather than on drop
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

enum SessionSlot {
    Idle { failures: u32 },
    Ready(Arc<dyn RenderSession>),
    Disabled,
    Closed,
}

/// Lazily started, bounded render capture
pub struct CaptureService {
    backend: Arc<dyn RenderBackend>,
    slot: Mutex<SessionSlot>,
    permits: Semaphore,
    options: CaptureOptions,
    timeout: Duration,
    dir: PathBuf,
    sequence: AtomicUsize,
}

impl CaptureService {
    /// Creates a service writing captures into `dir`
    pub fn new(backend: Arc<dyn RenderBackend>, config: &ScreenshotConfig, dir: PathBuf) -> Self {
        Self {
            backend,
            slot: Mutex::new(SessionSlot::Idle { failures: 0 }),
            permits: Semaphore::new(config.max_concurrent.max(1)),
            options: CaptureOptions::from_config(config),
            timeout: config.render_timeout(),
            dir,
            sequence: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Returns the shared session, launching it on first use
    ///
    /// The slot lock is held during launch so only one process is started.
    async fn session(&self) -> Result<Arc<dyn RenderSession>, CaptureError> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            SessionSlot::Ready(session) => return Ok(Arc::clone(session)),
            SessionSlot::Disabled => {
                return Err(CaptureError::BrowserUnavailable(
                    "screenshots disabled after repeated launch failures".to_string(),
                ))
            }
            SessionSlot::Closed => {
                return Err(CaptureError::BrowserUnavailable(
                    "browser already shut down".to_string(),
                ))
            }
            SessionSlot::Idle { .. } => {}
        }

        match self.backend.launch().await {
            Ok(session) => {
                *slot = SessionSlot::Ready(Arc::clone(&session));
                Ok(session)
            }
            Err(e) => {
                let failures = match &*slot {
                    SessionSlot::Idle { failures } => failures + 1,
                    _ => MAX_LAUNCH_FAILURES,
                };
                if failures >= MAX_LAUNCH_FAILURES {
                    tracing::warn!(
                        "Browser failed to start {} times, disabling screenshots: {}",
                        failures,
                        e
                    );
                    *slot = SessionSlot::Disabled;
                } else {
                    tracing::warn!("Browser failed to start (attempt {}): {}", failures, e);
                    *slot = SessionSlot::Idle { failures };
                }
                Err(e)
            }
        }
    }

    /// True once repeated launch failures have turned screenshots off
    pub async fn is_disabled(&self) -> bool {
        matches!(*self.slot.lock().await, SessionSlot::Disabled)
    }

    /// Captures one page; never fails the crawl
    pub async fn capture(&self, url: &Url) -> ScreenshotRef {
        let Ok(_permit) = self.permits.acquire().await else {
            return ScreenshotRef::Interrupted;
        };

        let session = match self.session().await {
            Ok(session) => session,
            Err(_) => return ScreenshotRef::BrowserUnavailable,
        };

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.dir.join(format!(
            "capture-{:05}.{}",
            seq,
            self.options.format.extension()
        ));

        let outcome = match tokio::time::timeout(
            self.timeout,
            session.capture(url, &self.options, &path),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!("Captured {} -> {}", url, path.display());
                ScreenshotRef::Saved { path }
            }
            Err(e) => {
                tracing::warn!("Screenshot of {} failed: {}", url, e);
                let _ = std::fs::remove_file(&path);
                ScreenshotRef::CaptureFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Stops the browser if it was started
    ///
    /// Safe to call more than once; the session is shut down only the first time.
    pub async fn shutdown(&self) -> bool {
        let previous = std::mem::replace(&mut *self.slot.lock().await, SessionSlot::Closed);
        match previous {
            SessionSlot::Ready(session) => {
                session.shutdown().await;
                true
            }
            _ => false,
        }
    }
}

/// Renames saved captures to their final names and builds descriptors
///
/// Pages are numbered by their 1-based position in path order. A rename
/// failure downgrades that page's screenshot to `CaptureFailed`.
pub fn finalize_artifacts(
    pages: &mut [PageRecord],
    store: &ArtifactStore,
    options: &CaptureOptions,
) -> Vec<ArtifactDescriptor> {
    let Some(dir) = store.path() else {
        return Vec::new();
    };

    let order: Vec<String> = {
        let mut sorted: Vec<&PageRecord> = pages.iter().collect();
        sort_by_path(&mut sorted);
        sorted.iter().map(|page| page.url.clone()).collect()
    };

    let mut artifacts = Vec::new();
    for (index, url) in order.iter().enumerate() {
        let position = index + 1;
        let Some(page) = pages.iter_mut().find(|page| &page.url == url) else {
            continue;
        };
        let Some(ScreenshotRef::Saved { path }) = &page.screenshot else {
            continue;
        };

        let target: PathBuf = dir.join(format!(
            "{:03}.{}",
            position,
            options.format.extension()
        ));
        match std::fs::rename(path, &target) {
            Ok(()) => {
                page.screenshot = Some(ScreenshotRef::Saved {
                    path: target.clone(),
                });
                artifacts.push(ArtifactDescriptor {
                    url: page.url.clone(),
                    path: target,
                    format: options.format,
                    viewport: options.viewport,
                    position,
                });
            }
            Err(e) => {
                tracing::warn!("Failed to finalize screenshot for {}: {}", page.url, e);
                page.screenshot = Some(ScreenshotRef::CaptureFailed {
                    reason: format!("rename failed: {}", e),
                });
            }
        }
    }

    artifacts
}
