//! Error types for the laboratory
//!
//! Registry misuse (`DuplicateRegistration`, `UnknownExperiment`,
//! `ReentrantRun`, `InvalidState`) is returned to the caller. Everything that
//! happens inside an experiment run is folded into an
//! [`ExperimentResult`](crate::ExperimentResult) instead.

use crate::config::ConfigError;
use crate::types::{ExperimentId, LaboratoryState};
use std::fmt;

/// Hook position within an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Before the subject is checked
    Setup,
    /// Test body
    Test,
    /// After every attempt
    Teardown,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Test => "test",
            Self::Teardown => "teardown",
        })
    }
}

/// Main laboratory error type
#[derive(Debug, thiserror::Error)]
pub enum LabError {
    /// Experiment ran without a bound subject
    #[error("experiment {id} has no subject")]
    MissingSubject {
        /// Experiment ID
        id: ExperimentId,
    },

    /// Experiment ID already registered
    #[error("experiment {0} is already registered")]
    DuplicateRegistration(ExperimentId),

    /// No experiment with this ID
    #[error("unknown experiment {0}")]
    UnknownExperiment(ExperimentId),

    /// Timeout fired before the experiment settled
    #[error("experiment {id} timed out after {timeout_ms}ms")]
    ExperimentTimeout {
        /// Experiment ID
        id: ExperimentId,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Teardown hook failed
    #[error("teardown of {id} failed: {message}")]
    TeardownError {
        /// Experiment ID
        id: ExperimentId,
        /// Failure text
        message: String,
    },

    /// `run_all` called while a run is in progress
    #[error("laboratory is already running")]
    ReentrantRun,

    /// Operation not valid in the current state
    #[error("cannot {action} while {state}")]
    InvalidState {
        /// Attempted operation
        action: &'static str,
        /// Current state
        state: LaboratoryState,
    },

    /// Experiment observed its cancellation token
    #[error("experiment {id} was cancelled")]
    Cancelled {
        /// Experiment ID
        id: ExperimentId,
    },

    /// Setup or test hook failed
    #[error("{stage} hook failed: {message}")]
    HookFailed {
        /// Failing hook
        stage: HookStage,
        /// Failure text
        message: String,
    },

    /// Experiment task ended abnormally
    #[error("experiment task aborted: {0}")]
    TaskAborted(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LabError {
    /// Create hook failure from a hook's error
    #[must_use]
    pub fn hook(stage: HookStage, err: &anyhow::Error) -> Self {
        Self::HookFailed {
            stage,
            message: format!("{err:#}"),
        }
    }

    /// Whether an experiment may retry after this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HookFailed {
                stage: HookStage::Setup | HookStage::Test,
                ..
            }
        )
    }

    /// Whether this error is caller misuse of the laboratory API
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::DuplicateRegistration(_)
                | Self::UnknownExperiment(_)
                | Self::ReentrantRun
                | Self::InvalidState { .. }
        )
    }
}
