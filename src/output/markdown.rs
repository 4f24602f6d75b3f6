//! Markdown report generation
//!
//! This module generates a human-readable markdown report of a crawl,
//! including run information, certificate metadata, statistics and the
//! path-sorted page table.

use crate::crawler::CrawlResult;
use crate::output::stats::CrawlStatistics;
use crate::output::traits::{OutputResult, ReportWriter};
use crate::url::url_path;
use std::path::Path;

/// Markdown report with a path-sorted page table
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownReport;

impl ReportWriter for MarkdownReport {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn render(&self, result: &CrawlResult) -> OutputResult<String> {
        Ok(format_markdown_report(result))
    }
}

/// Generates a markdown report for a crawl result
///
/// # Arguments
///
/// * `result` - The finished crawl
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(result: &CrawlResult, output_path: &Path) -> OutputResult<()> {
    MarkdownReport.write(result, output_path)
}

/// Formats a crawl result as markdown
pub fn format_markdown_report(result: &CrawlResult) -> String {
    let stats = CrawlStatistics::from_result(result);
    let mut md = String::new();

    md.push_str("# Sitemap Crawl Report\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Seed**: {}\n", result.seed));
    md.push_str(&format!("- **Started**: {}\n", result.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", result.finished_at.to_rfc3339()));
    md.push_str(&format!("- **Duration**: {:.1} seconds\n", stats.elapsed_secs));
    md.push_str(&format!(
        "- **Termination**: {}\n\n",
        match result.termination {
            crate::crawler::Termination::Drained => "all reachable pages visited",
            crate::crawler::Termination::TimedOut => "time budget exhausted",
            crate::crawler::Termination::Stopped => "stopped on request",
        }
    ));

    if let Some(ssl) = &result.ssl {
        md.push_str("## SSL Certificate\n\n");
        md.push_str(&format!("- **Issuer**: {}\n", ssl.issuer));
        md.push_str(&format!("- **Subject**: {}\n", ssl.subject));
        md.push_str(&format!("- **Valid From**: {}\n", ssl.valid_from));
        md.push_str(&format!("- **Valid To**: {}\n", ssl.valid_to));
        md.push_str(&format!("- **Serial Number**: {}\n", ssl.serial_number));
        md.push_str(&format!(
            "- **Signature Algorithm**: {}\n\n",
            ssl.signature_algorithm
        ));
    }

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Total Pages**: {}\n", stats.total_pages));
    md.push_str(&format!("- **Pages With Errors**: {}\n", stats.error_pages));
    md.push_str(&format!("- **Deepest Level**: {}\n", stats.max_depth));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n",
        stats.success_rate()
    ));
    if !result.screenshot_artifacts.is_empty() {
        md.push_str(&format!(
            "- **Screenshots**: {}\n",
            result.screenshot_artifacts.len()
        ));
    }
    md.push('\n');

    if !stats.pages_by_depth.is_empty() {
        md.push_str("## Depth Breakdown\n\n");
        md.push_str("| Depth | Pages |\n");
        md.push_str("|-------|-------|\n");
        for (depth, count) in &stats.pages_by_depth {
            md.push_str(&format!("| {} | {} |\n", depth, count));
        }
        md.push('\n');
    }

    md.push_str("## Pages\n\n");
    md.push_str("| # | Path | Title | Status | Depth | Screenshot |\n");
    md.push_str("|---|------|-------|--------|-------|------------|\n");
    for (index, page) in result.pages_by_path().iter().enumerate() {
        let screenshot = result
            .artifact_for(&page.url)
            .and_then(|a| a.path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            index + 1,
            escape_cell(&url_path(&page.url)),
            escape_cell(&page.title),
            page.status,
            page.depth,
            screenshot
        ));
    }
    md.push('\n');

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
