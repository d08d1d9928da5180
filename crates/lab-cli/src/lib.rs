//! # Lab CLI
//!
//! Loads declarative YAML suites into a [`Laboratory`] and writes the
//! resulting report. The `lab` binary is a thin shell over this crate.

pub mod suite;

pub use suite::{Comparison, ConfigOverrides, ExperimentSpec, HypothesisSpec, Suite, SuiteError, SubjectSpec};

use lab_core::{LabReport, Laboratory, LaboratoryConfig};
use lab_report::{ReportError, ReportFormat, Reporter};
use std::io::Write;
use std::path::Path;

/// Load a suite and build its laboratory
///
/// `config` is an optional TOML file forming the base layer; the suite's
/// own settings and then `overrides` are applied over it.
///
/// # Errors
/// - `SuiteError::Config` if the TOML file is unreadable or the merged
///   configuration is invalid
/// - any error from [`Suite::from_path`] or [`Suite::laboratory`]
pub fn load_laboratory(
    suite: &Path,
    config: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<Laboratory, SuiteError> {
    let base = match config {
        Some(path) => LaboratoryConfig::from_toml_file(path)?,
        None => LaboratoryConfig::default(),
    };
    Suite::from_path(suite)?.laboratory(base, overrides)
}

/// Write `report` to `output`, or render it into `out`
///
/// With an output path the format defaults to the one implied by its
/// extension; without one it defaults to text.
///
/// # Errors
/// - `ReportError::UnknownFormat` if no format is given and the extension is
///   not recognised
/// - `ReportError::Io` if writing fails
pub fn write_report(
    report: &LabReport,
    format: Option<ReportFormat>,
    output: Option<&Path>,
    out: &mut impl Write,
) -> Result<(), ReportError> {
    match output {
        Some(path) => {
            let format = match format {
                Some(format) => format,
                None => ReportFormat::from_path(path)?,
            };
            Reporter::save_as(report, path, format)
        }
        None => {
            let rendered = Reporter::format(report, format.unwrap_or_default())?;
            out.write_all(rendered.as_bytes())
                .and_then(|()| out.flush())
                .map_err(|source| ReportError::Io {
                    path: "<stdout>".to_string(),
                    source,
                })
        }
    }
}
