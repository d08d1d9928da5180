//! Core value types shared by experiments, the laboratory, and reporters

use chrono::{DateTime, Utc};
use lab_hypothesis::HypothesisResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Experiment identifier
pub type ExperimentId = String;

/// Lifecycle state of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentState {
    /// Not yet run, or reset
    #[default]
    Pending,
    /// An attempt is in progress
    Running,
    /// Every hypothesis held
    Passed,
    /// A hypothesis failed or the run errored
    Failed,
    /// Skipped without running any hook
    Skipped,
}

impl ExperimentState {
    /// Whether the state is terminal
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a laboratory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaboratoryState {
    /// Nothing running
    #[default]
    Idle,
    /// `run_all` in progress
    Running,
    /// `run_all` suspended between experiments
    Paused,
    /// Last run finished
    Completed,
    /// Last run hit an internal failure
    Failed,
}

impl fmt::Display for LaboratoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one experiment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentResult {
    /// Experiment ID
    pub experiment_id: ExperimentId,
    /// Experiment display name
    pub experiment_name: String,
    /// Whether the run passed
    pub success: bool,
    /// When the result was produced
    pub timestamp: DateTime<Utc>,
    /// Duration of the final attempt
    pub duration_ms: u64,
    /// Hypothesis results in registration order
    pub hypotheses: Vec<HypothesisResult>,
    /// Error that ended the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retries consumed, when any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl ExperimentResult {
    /// Failed result with no hypothesis results
    #[must_use]
    pub fn failure(
        experiment_id: impl Into<ExperimentId>,
        experiment_name: impl Into<String>,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            experiment_name: experiment_name.into(),
            success: false,
            timestamp: Utc::now(),
            duration_ms: 0,
            hypotheses: Vec::new(),
            error: Some(error.to_string()),
            retries: None,
        }
    }

    /// With duration
    #[inline]
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Retry count, zero when absent
    #[inline]
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retries.unwrap_or(0)
    }

    /// Failed hypothesis results
    pub fn failed_hypotheses(&self) -> impl Iterator<Item = &HypothesisResult> {
        self.hypotheses.iter().filter(|h| !h.passed)
    }
}

/// Aggregate statistics, always derived from the registry and results
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaboratoryStats {
    /// Registered experiments
    pub total_experiments: usize,
    /// Results with `success`
    pub passed: usize,
    /// Results without `success`
    pub failed: usize,
    /// Registered experiments with no result
    pub skipped: usize,
    /// Wall-clock duration of the run window
    pub duration_ms: u64,
    /// `passed / total`, 0 when there are no experiments
    pub success_rate: f64,
}

impl LaboratoryStats {
    /// Derive stats from a registry size and a set of results
    #[must_use]
    pub fn derive<'a>(
        total_experiments: usize,
        results: impl IntoIterator<Item = &'a ExperimentResult>,
        duration_ms: u64,
    ) -> Self {
        let (passed, failed) = results.into_iter().fold((0, 0), |(p, f), result| {
            if result.success {
                (p + 1, f)
            } else {
                (p, f + 1)
            }
        });

        #[allow(clippy::cast_precision_loss)]
        let success_rate = if total_experiments == 0 {
            0.0
        } else {
            passed as f64 / total_experiments as f64
        };

        Self {
            total_experiments,
            passed,
            failed,
            skipped: total_experiments.saturating_sub(passed + failed),
            duration_ms,
            success_rate,
        }
    }
}

/// Aggregated outcome of one laboratory run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabReport {
    /// Laboratory name
    pub laboratory_name: String,
    /// When the report was built
    pub timestamp: DateTime<Utc>,
    /// Derived statistics
    pub stats: LaboratoryStats,
    /// Results in registration order
    pub results: Vec<ExperimentResult>,
    /// Run window duration
    pub duration_ms: u64,
    /// `failed == 0 && skipped == 0`
    pub success: bool,
}

impl LabReport {
    /// Build report from derived stats and results
    #[must_use]
    pub fn new(
        laboratory_name: impl Into<String>,
        stats: LaboratoryStats,
        results: Vec<ExperimentResult>,
    ) -> Self {
        Self {
            laboratory_name: laboratory_name.into(),
            timestamp: Utc::now(),
            duration_ms: stats.duration_ms,
            success: stats.failed == 0 && stats.skipped == 0,
            stats,
            results,
        }
    }
}
