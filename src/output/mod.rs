//! Output module for crawl reports
//!
//! This module handles:
//! - Computing and printing crawl statistics
//! - Exporting the full result as JSON
//! - Generating a markdown report

mod json;
mod markdown;
pub mod stats;
mod traits;

pub use json::{write_json, JsonReport};
pub use markdown::{format_markdown_report, generate_markdown_report, MarkdownReport};
pub use stats::{print_statistics, CrawlStatistics};
pub use traits::{OutputError, OutputResult, ReportWriter};
