//! Crawler module for site traversal and page processing
//!
//! This module contains the core crawling logic, including:
//! - The URL frontier with deduplication and scope checks
//! - HTTP fetching with pacing and retry logic
//! - HTML parsing and link extraction
//! - Headless screenshot capture
//! - Certificate metadata lookup
//! - Overall crawl coordination and progress reporting

pub mod capture;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
pub mod progress;
mod record;
pub mod ssl;

pub use capture::{
    ArtifactStore, CaptureError, CaptureOptions, CaptureService, ChromeBackend, RenderBackend,
    RenderSession,
};
pub use coordinator::{run_crawl, Coordinator, StopHandle};
pub use fetcher::{
    build_http_client, FetchOutcome, FetchPool, FetchedDocument, RateGate, ResponseMeta,
};
pub use frontier::{Admission, Frontier, FrontierEntry};
pub use parser::{extract, is_html, ExtractedPage, NO_TITLE};
pub use progress::{ProgressChannel, ProgressEvent};
pub use record::{
    ArtifactDescriptor, CrawlResult, PageRecord, PageStatus, ScreenshotRef, Termination,
};
pub use ssl::{certificate_host, CertificateInspector, SslInfo, SslStatus, TlsInspector};
