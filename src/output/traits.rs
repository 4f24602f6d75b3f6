//! Report writer trait and output errors
//!
//! Every report format renders a finished [`CrawlResult`] to a string and
//! writes it to a file.

use crate::crawler::CrawlResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A report format
pub trait ReportWriter {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Renders the whole report in memory
    fn render(&self, result: &CrawlResult) -> OutputResult<String>;

    /// Renders the report and writes it to `path`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Report written
    /// * `Err(OutputError)` - Rendering or writing failed
    fn write(&self, result: &CrawlResult, path: &Path) -> OutputResult<()> {
        let body = self.render(result)?;
        let mut file = File::create(path)
            .map_err(|e| OutputError::Write(format!("{}: {}", path.display(), e)))?;
        file.write_all(body.as_bytes())?;
        tracing::info!("Wrote {} report to {}", self.name(), path.display());
        Ok(())
    }
}
