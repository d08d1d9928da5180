//! Per-attempt context handed to experiment hooks

use crate::cancel::CancellationToken;
use crate::types::ExperimentId;
use lab_hypothesis::SubjectRef;

/// Context for one attempt of an experiment
#[derive(Clone)]
pub struct RunContext {
    experiment_id: ExperimentId,
    attempt: u32,
    subject: Option<SubjectRef>,
    token: CancellationToken,
}

impl RunContext {
    pub(crate) fn new(
        experiment_id: ExperimentId,
        attempt: u32,
        subject: Option<SubjectRef>,
        token: CancellationToken,
    ) -> Self {
        Self {
            experiment_id,
            attempt,
            subject,
            token,
        }
    }

    /// Experiment ID
    #[inline]
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Zero-based attempt number; equals the retries consumed so far
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Bound subject, if any
    #[inline]
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectRef> {
        self.subject.as_ref()
    }

    /// Cancellation token for this run
    #[inline]
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether this run was cancelled
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("experiment_id", &self.experiment_id)
            .field("attempt", &self.attempt)
            .field("has_subject", &self.subject.is_some())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
