//! # Lab Hypothesis
//!
//! Composable assertions evaluated against a subject under test.
//!
//! ## Core Concepts
//!
//! - **[`Subject`]**: the stateful thing being tested (state, props, render output)
//! - **[`Hypothesis`]**: a named async assertion over a subject
//! - **Combinators**: [`Hypothesis::not`], [`Hypothesis::and`], [`Hypothesis::or`]
//! - **Factories**: parameterized assertions in [`assertions`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use lab_hypothesis::prelude::*;
//!
//! let subject = StaticSubject::new().with_state("count", 0).into_ref();
//! let check = assertions::to_be_mounted().and(&assertions::to_have_state("count", 0))?;
//! assert!(check.validate(&subject).await.passed);
//! ```

pub mod assertions;
pub mod error;
pub mod hypothesis;
pub mod subject;

pub use error::{panic_message, AssertionFailure, HypothesisError, SubjectError};
pub use hypothesis::{
    AssertionFuture, AssertionKind, AssertionOutcome, Hypothesis, HypothesisResult,
    NEGATION_PASSED_MESSAGE, NO_ASSERTION_MESSAGE,
};
pub use subject::{
    strip_tags, Snapshot, SnapshotPredicate, StaticSubject, Subject, SubjectRef, ValueMap,
    WaitOptions,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::assertions;
    pub use crate::error::{AssertionFailure, HypothesisError, SubjectError};
    pub use crate::hypothesis::{AssertionKind, Hypothesis, HypothesisResult};
    pub use crate::subject::{Snapshot, StaticSubject, Subject, SubjectRef, WaitOptions};
}
