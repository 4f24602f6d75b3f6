//! JSON export of the crawl result

use crate::crawler::CrawlResult;
use crate::output::traits::{OutputResult, ReportWriter};
use std::path::Path;

/// Pretty-printed JSON of the full result
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReport;

impl ReportWriter for JsonReport {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn render(&self, result: &CrawlResult) -> OutputResult<String> {
        Ok(serde_json::to_string_pretty(result)?)
    }
}

/// Writes the result as JSON to `path`
pub fn write_json(result: &CrawlResult, path: &Path) -> OutputResult<()> {
    JsonReport.write(result, path)
}
