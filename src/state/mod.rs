//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: The phases of one crawl (initializing, crawling, draining, ...)
//! - `CrawlState`: Owns the current phase and rejects illegal transitions

mod crawl_phase;

pub use crawl_phase::{CrawlPhase, CrawlState};
