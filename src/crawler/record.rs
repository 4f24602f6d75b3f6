//! Page records and the final crawl result
//!
//! Records are created once per fetched URL and never mutated afterwards,
//! except for the screenshot reference which is attached when the page's
//! capture finishes.

use crate::config::{ImageFormat, Viewport};
use crate::crawler::capture::ArtifactStore;
use crate::crawler::ssl::SslInfo;
use crate::url::url_path;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::PathBuf;

/// HTTP status of a page, or a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// The server answered with this status code
    Code(u16),
    /// No response after every attempt
    Error,
}

impl PageStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Code(code) => Some(*code),
            Self::Error => None,
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{}", code),
            Self::Error => f.write_str("Error"),
        }
    }
}

// Integer for a response, the string "Error" otherwise
impl Serialize for PageStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Code(code) => serializer.serialize_u16(*code),
            Self::Error => serializer.serialize_str("Error"),
        }
    }
}

/// Screenshot outcome attached to a page record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ScreenshotRef {
    /// The artifact was written to `path`
    Saved { path: PathBuf },

    /// The render engine could not be started, or was disabled after
    /// repeated start failures
    BrowserUnavailable,

    /// Navigation or capture failed for this page
    CaptureFailed { reason: String },

    /// The crawl ended before the capture finished
    Interrupted,
}

impl ScreenshotRef {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// One fetched page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub url: String,
    pub title: String,
    pub meta_description: String,
    pub h1: String,
    pub depth: u32,
    pub status: PageStatus,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub content_length: Option<u64>,

    /// Failure description for error records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Requests sent for this page
    pub attempts: u32,

    #[serde(rename = "screenshotRef", skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotRef>,
}

impl PageRecord {
    /// Builds the record for a fetch that never got a response
    pub fn failed(url: &str, depth: u32, error: String, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            meta_description: String::new(),
            h1: String::new(),
            depth,
            status: PageStatus::Error,
            content_type: None,
            last_modified: None,
            content_length: None,
            error: Some(error),
            attempts,
            screenshot: None,
        }
    }

    /// URL path used for ordering
    pub fn path(&self) -> String {
        url_path(&self.url)
    }
}

/// A screenshot file produced for one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    /// Source page URL
    pub url: String,

    /// Location of the image file
    pub path: PathBuf,

    pub format: ImageFormat,
    pub viewport: Viewport,

    /// 1-based position of the page in path order
    pub position: usize,
}

/// How the crawl reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// Frontier empty and nothing in flight
    Drained,
    /// The global wall-clock budget ran out
    TimedOut,
    /// A stop signal was received
    Stopped,
}

/// Final bundle returned once per crawl
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    /// Seed URL the crawl started from
    pub seed: String,

    /// Pages in completion order
    pub pages: Vec<PageRecord>,

    pub screenshot_artifacts: Vec<ArtifactDescriptor>,

    #[serde(rename = "sslMeta", skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslInfo>,

    /// True once the crawl has reached a terminal state, partial or not
    pub is_complete: bool,

    pub termination: Termination,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// Owner of the scratch directory holding the artifacts
    #[serde(skip)]
    pub(crate) artifacts: ArtifactStore,
}

impl CrawlResult {
    /// Pages sorted by URL path, then full URL
    ///
    /// This is the order used to number screenshot artifacts.
    pub fn pages_by_path(&self) -> Vec<&PageRecord> {
        let mut pages: Vec<&PageRecord> = self.pages.iter().collect();
        sort_by_path(&mut pages);
        pages
    }

    /// Looks up the artifact recorded for a page
    pub fn artifact_for(&self, url: &str) -> Option<&ArtifactDescriptor> {
        self.screenshot_artifacts.iter().find(|a| a.url == url)
    }

    /// Scratch directory holding the artifacts, if one is still alive
    pub fn artifact_dir(&self) -> Option<&std::path::Path> {
        self.artifacts.path()
    }

    /// Wall-clock duration of the crawl
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Keeps the scratch directory after the result is dropped
    ///
    /// Returns the directory path; the caller becomes responsible for it.
    pub fn persist_artifacts(&mut self) -> Option<PathBuf> {
        self.artifacts.persist()
    }

    /// Deletes the scratch directory and every artifact in it
    ///
    /// Artifact paths stay valid until this is called or the result is dropped.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        self.artifacts.cleanup()
    }
}

/// Orders records by URL path, breaking ties with the full URL
pub(crate) fn sort_by_path(pages: &mut [&PageRecord]) {
    pages.sort_by_cached_key(|page| (page.path(), page.url.clone()));
}
