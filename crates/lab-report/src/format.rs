//! Output formats and report errors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Report rendering errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// JSON serialization failed
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Report file could not be written
    #[error("failed to write report to {path}: {source}")]
    Io {
        /// Destination path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Format name or file extension not recognised
    #[error("unknown report format '{0}'")]
    UnknownFormat(String),
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Fixed-width plain text
    #[default]
    Text,
    /// Direct serialization of the report
    Json,
    /// Self-contained HTML document
    Html,
    /// Markdown with a summary table
    Markdown,
}

impl ReportFormat {
    /// All formats
    pub const ALL: [ReportFormat; 4] = [Self::Text, Self::Json, Self::Html, Self::Markdown];

    /// Infer format from a file extension
    ///
    /// # Errors
    /// - `ReportError::UnknownFormat` if the path has no recognised extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        path.extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ReportError::UnknownFormat(path.display().to_string()))?
            .parse()
    }

    /// Conventional file extension
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Html => "html",
            Self::Markdown => "md",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "html" | "htm" => Ok(Self::Html),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Err(ReportError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Html => "html",
            Self::Markdown => "markdown",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("TEXT".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!("txt".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert!(matches!(
            "pdf".parse::<ReportFormat>(),
            Err(ReportError::UnknownFormat(name)) if name == "pdf"
        ));
    }

    #[test]
    fn infers_from_extension() {
        assert_eq!(ReportFormat::from_path("out/report.html").unwrap(), ReportFormat::Html);
        assert_eq!(ReportFormat::from_path("report.JSON").unwrap(), ReportFormat::Json);
        assert!(ReportFormat::from_path("report").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for format in ReportFormat::ALL {
            assert_eq!(format.to_string().parse::<ReportFormat>().unwrap(), format);
            assert_eq!(format.extension().parse::<ReportFormat>().unwrap(), format);
        }
    }
}
