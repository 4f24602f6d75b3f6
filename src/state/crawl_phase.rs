/// Crawl phase definitions for tracking a crawl from start to finish
///
/// This module defines the phases a crawl moves through and which
/// transitions between them are legal.
use crate::CrawlError;
use serde::Serialize;
use std::fmt;

/// Represents the current phase of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrawlPhase {
    // ===== Setup Phases =====
    /// Configuration is being applied and resources prepared
    Initializing,

    /// Certificate metadata is being looked up (https seeds only)
    SslCheck,

    /// The seed has been admitted and the first fetch is about to go out
    StartingCrawler,

    // ===== Active Phases =====
    /// Pages are being fetched and links admitted
    Crawling,

    /// The frontier is empty; outstanding captures are finishing
    Draining,

    // ===== Terminal Phases =====
    /// Every admitted page has been recorded
    Completed,

    /// The global budget ran out; partial results are returned
    TimedOut,

    /// A stop signal ended the crawl; partial results are returned
    Stopped,
}

impl CrawlPhase {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Stopped)
    }

    /// Returns true while pages may still be dispatched
    pub fn is_active(&self) -> bool {
        matches!(self, Self::StartingCrawler | Self::Crawling)
    }

    /// Checks whether moving from `self` to `next` is legal
    ///
    /// `TimedOut` and `Stopped` are reachable from every non-terminal phase.
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        use CrawlPhase::*;

        if self.is_terminal() {
            return false;
        }

        match next {
            TimedOut | Stopped => true,
            Initializing => false,
            SslCheck => *self == Initializing,
            StartingCrawler => matches!(self, Initializing | SslCheck),
            Crawling => matches!(self, StartingCrawler | Crawling),
            Draining => matches!(self, StartingCrawler | Crawling),
            Completed => *self == Draining,
        }
    }

    /// Wire representation used in progress events
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::SslCheck => "ssl-check",
            Self::StartingCrawler => "starting-crawler",
            Self::Crawling => "crawling",
            Self::Draining => "draining",
            Self::Completed => "completed",
            Self::TimedOut => "timed-out",
            Self::Stopped => "stopped",
        }
    }

    /// Progress percentage reported on entering this phase
    pub fn base_percentage(&self) -> u8 {
        match self {
            Self::Initializing => 5,
            Self::SslCheck => 7,
            Self::StartingCrawler | Self::Crawling => 10,
            Self::Draining => 90,
            Self::Completed | Self::TimedOut | Self::Stopped => 100,
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the phase of one crawl and enforces legal transitions
#[derive(Debug, Clone)]
pub struct CrawlState {
    phase: CrawlPhase,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlState {
    pub fn new() -> Self {
        Self {
            phase: CrawlPhase::Initializing,
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Moves to `next`, rejecting illegal transitions
    ///
    /// Re-entering `Crawling` is allowed so every page event can pass through
    /// the same call.
    pub fn advance(&mut self, next: CrawlPhase) -> Result<(), CrawlError> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        if self.phase != next {
            tracing::debug!("Crawl phase {} -> {}", self.phase, next);
        }
        self.phase = next;
        Ok(())
    }
}
