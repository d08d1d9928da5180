//! # Lab Report
//!
//! Pure functions over a [`LabReport`]: four renderers plus query helpers.
//! Nothing here mutates the report.
//!
//! ```rust,ignore
//! let report = lab.run_all().await?;
//! println!("{}", Reporter::format(&report, ReportFormat::Text)?);
//! for failure in Reporter::failures(&report) {
//!     eprintln!("{}: {:?}", failure.experiment_id, failure.error);
//! }
//! ```

pub mod format;
pub mod render;

pub use format::{ReportError, ReportFormat};

use lab_core::{ExperimentResult, LabReport};
use std::path::Path;

/// Report renderers and queries
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter;

impl Reporter {
    /// Render in `format`
    ///
    /// # Errors
    /// - `ReportError::Serialize` if JSON serialization fails
    pub fn format(report: &LabReport, format: ReportFormat) -> Result<String, ReportError> {
        Ok(match format {
            ReportFormat::Text => Self::to_text(report),
            ReportFormat::Json => Self::to_json(report)?,
            ReportFormat::Html => Self::to_html(report),
            ReportFormat::Markdown => Self::to_markdown(report),
        })
    }

    /// Fixed-width text
    #[must_use]
    pub fn to_text(report: &LabReport) -> String {
        render::text(report)
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    /// - `ReportError::Serialize` if serialization fails
    pub fn to_json(report: &LabReport) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Self-contained HTML
    #[must_use]
    pub fn to_html(report: &LabReport) -> String {
        render::html(report)
    }

    /// Markdown
    #[must_use]
    pub fn to_markdown(report: &LabReport) -> String {
        render::markdown(report)
    }

    /// Write the report in the format implied by `path`'s extension
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    /// - `ReportError::UnknownFormat` if the extension is not recognised
    /// - `ReportError::Io` if the file cannot be written
    pub fn save(report: &LabReport, path: impl AsRef<Path>) -> Result<ReportFormat, ReportError> {
        let path = path.as_ref();
        let format = ReportFormat::from_path(path)?;
        Self::save_as(report, path, format)?;
        Ok(format)
    }

    /// Write the report in `format` regardless of extension
    ///
    /// # Errors
    /// - `ReportError::Io` if the file cannot be written
    pub fn save_as(
        report: &LabReport,
        path: impl AsRef<Path>,
        format: ReportFormat,
    ) -> Result<(), ReportError> {
        let path = path.as_ref();
        let rendered = Self::format(report, format)?;
        let io_error = |source| ReportError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(path, rendered).map_err(io_error)?;

        tracing::info!(path = %path.display(), %format, "report written");
        Ok(())
    }

    /// Failed results, in report order
    #[must_use]
    pub fn failures(report: &LabReport) -> Vec<&ExperimentResult> {
        report.results.iter().filter(|r| !r.success).collect()
    }

    /// Passed results, in report order
    #[must_use]
    pub fn passes(report: &LabReport) -> Vec<&ExperimentResult> {
        report.results.iter().filter(|r| r.success).collect()
    }

    /// Up to `n` results, longest first; ties keep report order
    #[must_use]
    pub fn slowest(report: &LabReport, n: usize) -> Vec<&ExperimentResult> {
        let mut results: Vec<_> = report.results.iter().collect();
        results.sort_by(|a, b| b.duration_ms.cmp(&a.duration_ms));
        results.truncate(n);
        results
    }

    /// Results that needed at least one retry
    #[must_use]
    pub fn retried(report: &LabReport) -> Vec<&ExperimentResult> {
        report
            .results
            .iter()
            .filter(|r| r.retry_count() > 0)
            .collect()
    }
}
