//! Statistics computed from a finished crawl
//!
//! This module derives summary numbers from a [`CrawlResult`] and prints
//! them for the command line.

use crate::crawler::{CrawlResult, PageStatus};
use crate::url::extract_host;
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    /// Total number of page records
    pub total_pages: usize,

    /// Pages whose status is anything but 200
    pub error_pages: usize,

    /// Pages that never got a response
    pub failed_fetches: usize,

    /// Deepest level recorded
    pub max_depth: u32,

    /// Distinct hosts among recorded URLs
    pub unique_hosts: usize,

    /// Count of pages per depth
    pub pages_by_depth: BTreeMap<u32, usize>,

    /// Count of pages per status, "Error" for transport failures
    pub pages_by_status: BTreeMap<String, usize>,

    pub screenshots_saved: usize,
    pub screenshots_failed: usize,

    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
}

impl CrawlStatistics {
    /// Computes statistics for a result
    pub fn from_result(result: &CrawlResult) -> Self {
        let mut pages_by_depth = BTreeMap::new();
        let mut pages_by_status = BTreeMap::new();
        let mut hosts = HashSet::new();
        let mut screenshots_saved = 0;
        let mut screenshots_failed = 0;

        for page in &result.pages {
            *pages_by_depth.entry(page.depth).or_insert(0) += 1;
            *pages_by_status.entry(page.status.to_string()).or_insert(0) += 1;

            if let Some(host) = Url::parse(&page.url).ok().and_then(|u| extract_host(&u)) {
                hosts.insert(host);
            }

            match &page.screenshot {
                Some(shot) if shot.is_saved() => screenshots_saved += 1,
                Some(_) => screenshots_failed += 1,
                None => {}
            }
        }

        Self {
            total_pages: result.pages.len(),
            error_pages: result
                .pages
                .iter()
                .filter(|p| p.status != PageStatus::Code(200))
                .count(),
            failed_fetches: result.pages.iter().filter(|p| p.status.is_error()).count(),
            max_depth: pages_by_depth.keys().next_back().copied().unwrap_or(0),
            unique_hosts: hosts.len(),
            pages_by_depth,
            pages_by_status,
            screenshots_saved,
            screenshots_failed,
            elapsed_secs: result.elapsed().num_milliseconds() as f64 / 1000.0,
        }
    }

    /// Share of pages with status 200, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        ((self.total_pages - self.error_pages) as f64 / self.total_pages as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total pages: {}", stats.total_pages);
    println!("  Pages with errors: {}", stats.error_pages);
    println!("  Failed fetches: {}", stats.failed_fetches);
    println!("  Unique hosts: {}", stats.unique_hosts);
    println!("  Deepest level: {}", stats.max_depth);
    println!("  Elapsed: {:.1}s", stats.elapsed_secs);
    println!();

    println!("Pages by Depth:");
    for (depth, count) in &stats.pages_by_depth {
        println!("  {}: {}", depth, count);
    }
    println!();

    println!("Pages by Status:");
    let mut status_counts: Vec<_> = stats.pages_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (status, count) in status_counts {
        println!("  {}: {}", status, count);
    }
    println!();

    if stats.screenshots_saved + stats.screenshots_failed > 0 {
        println!(
            "Screenshots: {} saved, {} failed\n",
            stats.screenshots_saved, stats.screenshots_failed
        );
    }

    println!(
        "Success Rate: {:.1}% ({} / {} pages returned 200)",
        stats.success_rate(),
        stats.total_pages - stats.error_pages,
        stats.total_pages
    );
}
