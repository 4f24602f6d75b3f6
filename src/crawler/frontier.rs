//! URL frontier: the visited set and the pending work queue
//!
//! The frontier is the only place where URLs are deduplicated. Admission
//! checks and the visited-set insert happen under one lock, so two pages
//! discovering the same link at the same time can never both enqueue it.

use crate::url::{normalize_url, CrawlScope, ScopeViolation};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized absolute URL
    pub url: Url,

    /// Link distance from the seed
    pub depth: u32,
}

/// Outcome of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The URL was new and has been queued
    Admitted,
    /// The URL was admitted before
    Duplicate,
    /// Host differs from the seed's site
    OffSite,
    /// Path lies outside the seed's base path
    OutsideBasePath,
    /// Path names a binary or static asset
    Asset,
    /// The page cap has been reached
    PageCapReached,
    /// The crawl has stopped accepting work
    Closed,
    /// The URL could not be normalized
    Malformed,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

impl From<ScopeViolation> for Admission {
    fn from(violation: ScopeViolation) -> Self {
        match violation {
            ScopeViolation::OffSite => Self::OffSite,
            ScopeViolation::OutsideBasePath => Self::OutsideBasePath,
            ScopeViolation::Asset => Self::Asset,
        }
    }
}

#[derive(Debug, Default)]
struct FrontierInner {
    visited: HashSet<String>,
    queue: VecDeque<FrontierEntry>,
    closed: bool,
}

/// Single-owner frontier guarding the visited set and FIFO queue
///
/// Dequeue order is FIFO, so depth never decreases as the frontier drains
/// level by level.
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    scope: CrawlScope,
    max_pages: usize,
}

impl Frontier {
    /// Creates an empty frontier for the given scope and page cap
    pub fn new(scope: CrawlScope, max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(FrontierInner::default()),
            scope,
            max_pages,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scope(&self) -> &CrawlScope {
        &self.scope
    }

    /// Admits the seed unconditionally at depth 0
    ///
    /// The seed bypasses the base-path and asset checks but still counts
    /// towards the page cap. Returns the queued entry.
    pub fn seed(&self, seed: &Url) -> FrontierEntry {
        let url = normalize_url(seed).unwrap_or_else(|_| seed.clone());
        let entry = FrontierEntry { url, depth: 0 };

        let mut inner = self.lock();
        if inner.visited.insert(entry.url.to_string()) {
            inner.queue.push_back(entry.clone());
        }
        entry
    }

    /// Boolean admission contract: true exactly once per URL
    pub fn admit(&self, url: &Url, depth: u32) -> bool {
        self.try_admit(url, depth).is_admitted()
    }

    /// Runs every admission check and queues the URL if all pass
    ///
    /// Normalization and scope are checked first; the closed, duplicate and
    /// page-cap checks and the visited-set insert then run under one lock.
    pub fn try_admit(&self, url: &Url, depth: u32) -> Admission {
        let normalized = match normalize_url(url) {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!("Dropping malformed link {}: {}", url, e);
                return Admission::Malformed;
            }
        };

        if let Err(violation) = self.scope.check(&normalized) {
            return violation.into();
        }

        let key = normalized.to_string();
        let mut inner = self.lock();

        if inner.closed {
            return Admission::Closed;
        }
        if inner.visited.contains(&key) {
            return Admission::Duplicate;
        }
        if inner.visited.len() >= self.max_pages {
            return Admission::PageCapReached;
        }

        inner.visited.insert(key);
        inner.queue.push_back(FrontierEntry {
            url: normalized,
            depth,
        });
        Admission::Admitted
    }

    /// Pops the oldest pending entry
    pub fn dequeue(&self) -> Option<FrontierEntry> {
        self.lock().queue.pop_front()
    }

    /// Stops all further admission and drops pending entries
    ///
    /// Returns the number of entries discarded.
    pub fn close(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let dropped = inner.queue.len();
        inner.queue.clear();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of entries waiting to be fetched
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Number of URLs ever admitted, seed included
    pub fn admitted(&self) -> usize {
        self.lock().visited.len()
    }

    /// Whether the page cap leaves room for more admissions
    pub fn has_capacity(&self) -> bool {
        self.admitted() < self.max_pages
    }
}
