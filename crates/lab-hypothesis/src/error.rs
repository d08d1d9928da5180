//! Error types for hypotheses and subjects
//!
//! - [`SubjectError`]: failures reported by a subject under test
//! - [`AssertionFailure`]: an assertion that did not hold
//! - [`HypothesisError`]: misuse of the combinator API

use serde_json::Value;
use std::any::Any;

/// Errors raised by a [`Subject`](crate::Subject) implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectError {
    /// `wait_for` predicate never held
    #[error("condition not met within {timeout_ms}ms")]
    WaitTimeout {
        /// Configured timeout
        timeout_ms: u64,
    },

    /// An interaction could not be dispatched
    #[error("interaction failed: {0}")]
    InteractionFailed(String),

    /// The subject is not mounted
    #[error("subject is not mounted")]
    NotMounted,

    /// Implementation-specific failure
    #[error("{0}")]
    Other(String),
}

/// An assertion that did not hold
///
/// Carries the human-readable message plus the operands that were compared,
/// so a failure can be diagnosed without re-running it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct AssertionFailure {
    /// Failure description
    pub message: String,
    /// Expected operand, if the assertion compares values
    pub expected: Option<Value>,
    /// Observed operand, if the assertion compares values
    pub actual: Option<Value>,
}

impl AssertionFailure {
    /// Create failure with message only
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Create failure for a value mismatch
    #[inline]
    #[must_use]
    pub fn mismatch(
        message: impl Into<String>,
        expected: impl Into<Value>,
        actual: impl Into<Value>,
    ) -> Self {
        Self {
            message: message.into(),
            expected: Some(expected.into()),
            actual: Some(actual.into()),
        }
    }
}

impl From<SubjectError> for AssertionFailure {
    fn from(err: SubjectError) -> Self {
        Self::new(err.to_string())
    }
}

/// Combinator misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HypothesisError {
    /// Operand was built without an assertion
    #[error("hypothesis '{name}' has no assertion to combine")]
    MissingAssertion {
        /// Name of the offending hypothesis
        name: String,
    },
}

/// Render a panic payload as text
///
/// Panics raised with `panic!("...")` carry either `&'static str` or
/// `String`; anything else is reported generically.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
