//! Progress events and the channel they are published on
//!
//! The coordinator publishes; any number of reporters subscribe. Delivery
//! is best-effort: a subscriber that falls behind loses the oldest events,
//! and a late subscriber sees only what is published after it joined.

use crate::state::CrawlPhase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the oldest are dropped
pub const DEFAULT_CAPACITY: usize = 256;

/// One progress milestone
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: CrawlPhase,
    pub message: String,

    /// 0 to 100
    pub percentage: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_depth: Option<u32>,

    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Creates an event at the phase's base percentage
    pub fn new(phase: CrawlPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            percentage: phase.base_percentage(),
            current_url: None,
            pages_found: None,
            queue_size: None,
            current_depth: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_percentage(mut self, percentage: u8) -> Self {
        self.percentage = percentage.min(100);
        self
    }

    pub fn with_page(mut self, url: &str, depth: u32) -> Self {
        self.current_url = Some(url.to_string());
        self.current_depth = Some(depth);
        self
    }

    pub fn with_counts(mut self, pages_found: usize, queue_size: usize) -> Self {
        self.pages_found = Some(pages_found);
        self.queue_size = Some(queue_size);
        self
    }
}

/// Percentage reported while crawling: 10 plus up to 80 by page count
pub fn crawling_percentage(pages: usize, max_pages: usize) -> u8 {
    if max_pages == 0 {
        return 90;
    }
    let share = (pages.min(max_pages) * 80) / max_pages;
    10 + share as u8
}

/// Publisher side of the progress stream
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; having no subscribers is not an error
    pub fn publish(&self, event: ProgressEvent) {
        tracing::trace!("progress [{}] {}% {}", event.phase, event.percentage, event.message);
        let _ = self.sender.send(event);
    }

    /// Subscribes to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
