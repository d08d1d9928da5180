//! Hypotheses and their combinator algebra
//!
//! A [`Hypothesis`] is a named assertion over a [`Subject`](crate::Subject).
//! Hypotheses are immutable: [`Hypothesis::not`], [`Hypothesis::and`] and
//! [`Hypothesis::or`] wrap their operands into new values.

use crate::error::{panic_message, AssertionFailure, HypothesisError};
use crate::subject::SubjectRef;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Message reported when a hypothesis has no assertion
pub const NO_ASSERTION_MESSAGE: &str = "No assertion function defined";

/// Message reported when a negated hypothesis's operand passed
pub const NEGATION_PASSED_MESSAGE: &str = "negated assertion passed unexpectedly";

/// Outcome of running an assertion
pub type AssertionOutcome = Result<(), AssertionFailure>;

/// Boxed assertion future
pub type AssertionFuture = BoxFuture<'static, AssertionOutcome>;

type AssertionFn = Arc<dyn Fn(SubjectRef) -> AssertionFuture + Send + Sync>;

/// Which factory or combinator produced a hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertionKind {
    /// User-supplied assertion
    #[serde(rename = "custom")]
    Custom,
    /// Text containment
    #[serde(rename = "toContainText")]
    ContainText,
    /// State field equality
    #[serde(rename = "toHaveState")]
    HaveState,
    /// Prop field equality
    #[serde(rename = "toHaveProp")]
    HaveProp,
    /// Mounted check
    #[serde(rename = "toBeMounted")]
    BeMounted,
    /// Active check
    #[serde(rename = "toBeActive")]
    BeActive,
    /// Render count equality
    #[serde(rename = "toHaveRendered")]
    HaveRendered,
    /// Regex over render output
    #[serde(rename = "toMatchOutput")]
    MatchOutput,
    /// Element presence
    #[serde(rename = "toHaveElement")]
    HaveElement,
    /// Element count
    #[serde(rename = "toHaveElementCount")]
    HaveElementCount,
    /// Exact text
    #[serde(rename = "toHaveText")]
    HaveText,
    /// Substring within element text
    #[serde(rename = "toHaveTextContaining")]
    HaveTextContaining,
    /// Generic comparator
    #[serde(rename = "toSatisfy")]
    Satisfy,
    /// Eventual consistency
    #[serde(rename = "toEventually")]
    Eventually,
    /// Negation
    #[serde(rename = "not")]
    Not,
    /// Conjunction
    #[serde(rename = "and")]
    And,
    /// Disjunction
    #[serde(rename = "or")]
    Or,
}

impl AssertionKind {
    /// Stable string form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::ContainText => "toContainText",
            Self::HaveState => "toHaveState",
            Self::HaveProp => "toHaveProp",
            Self::BeMounted => "toBeMounted",
            Self::BeActive => "toBeActive",
            Self::HaveRendered => "toHaveRendered",
            Self::MatchOutput => "toMatchOutput",
            Self::HaveElement => "toHaveElement",
            Self::HaveElementCount => "toHaveElementCount",
            Self::HaveText => "toHaveText",
            Self::HaveTextContaining => "toHaveTextContaining",
            Self::Satisfy => "toSatisfy",
            Self::Eventually => "toEventually",
            Self::Not => "not",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HypothesisResult {
    /// Hypothesis name
    pub name: String,
    /// Whether the assertion held
    pub passed: bool,
    /// Expected operand on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    /// Observed operand on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Producing factory or combinator
    pub assertion_kind: AssertionKind,
}

impl HypothesisResult {
    /// Passing result
    #[must_use]
    pub fn pass(name: impl Into<String>, kind: AssertionKind) -> Self {
        Self {
            name: name.into(),
            passed: true,
            expected: None,
            actual: None,
            message: None,
            assertion_kind: kind,
        }
    }

    /// Failing result built from an assertion failure
    #[must_use]
    pub fn fail(name: impl Into<String>, kind: AssertionKind, failure: AssertionFailure) -> Self {
        Self {
            name: name.into(),
            passed: false,
            expected: failure.expected,
            actual: failure.actual,
            message: Some(failure.message),
            assertion_kind: kind,
        }
    }
}

/// A named, composable assertion over a subject
#[derive(Clone)]
pub struct Hypothesis {
    name: String,
    kind: AssertionKind,
    assertion: Option<AssertionFn>,
}

impl Hypothesis {
    /// Create hypothesis from an async assertion
    ///
    /// The assertion receives the subject the hypothesis is validated against
    /// and signals failure by returning an [`AssertionFailure`].
    pub fn new<F, Fut>(name: impl Into<String>, assertion: F) -> Self
    where
        F: Fn(SubjectRef) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AssertionOutcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            kind: AssertionKind::Custom,
            assertion: Some(Arc::new(move |subject| assertion(subject).boxed())),
        }
    }

    /// Create hypothesis from a synchronous check
    pub fn check<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&SubjectRef) -> AssertionOutcome + Send + Sync + 'static,
    {
        let check = Arc::new(check);
        Self::new(name, move |subject| {
            let check = Arc::clone(&check);
            async move { check(&subject) }
        })
    }

    /// Create hypothesis with no assertion
    ///
    /// Validation always fails with [`NO_ASSERTION_MESSAGE`] and the
    /// combinators reject it.
    #[inline]
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AssertionKind::Custom,
            assertion: None,
        }
    }

    /// With assertion kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: AssertionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Get name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get assertion kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> AssertionKind {
        self.kind
    }

    /// Whether an assertion is attached
    #[inline]
    #[must_use]
    pub fn has_assertion(&self) -> bool {
        self.assertion.is_some()
    }

    /// Evaluate against `subject`
    ///
    /// Never fails: a failing or panicking assertion is recorded in the
    /// returned result.
    pub async fn validate(&self, subject: &SubjectRef) -> HypothesisResult {
        let Some(assertion) = &self.assertion else {
            return HypothesisResult::fail(
                &self.name,
                self.kind,
                AssertionFailure::new(NO_ASSERTION_MESSAGE),
            );
        };

        let subject = Arc::clone(subject);
        let outcome = AssertUnwindSafe(async move { assertion(subject).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(AssertionFailure::new(format!(
                    "assertion panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match outcome {
            Ok(()) => {
                tracing::debug!(hypothesis = %self.name, "hypothesis passed");
                HypothesisResult::pass(&self.name, self.kind)
            }
            Err(failure) => {
                tracing::debug!(hypothesis = %self.name, message = %failure.message, "hypothesis failed");
                HypothesisResult::fail(&self.name, self.kind, failure)
            }
        }
    }

    /// Negate this hypothesis
    ///
    /// # Errors
    /// - `HypothesisError::MissingAssertion` if this hypothesis has no assertion
    pub fn not(&self) -> Result<Hypothesis, HypothesisError> {
        let inner = self.require_assertion()?;
        let assertion: AssertionFn = Arc::new(move |subject| {
            let inner = Arc::clone(&inner);
            async move {
                match inner(subject).await {
                    Ok(()) => Err(AssertionFailure::new(NEGATION_PASSED_MESSAGE)),
                    Err(_) => Ok(()),
                }
            }
            .boxed()
        });

        Ok(Hypothesis {
            name: format!("NOT {}", self.name),
            kind: AssertionKind::Not,
            assertion: Some(assertion),
        })
    }

    /// Require this and `other`
    ///
    /// `other` is only evaluated if this hypothesis holds; the first failure
    /// is surfaced unchanged.
    ///
    /// # Errors
    /// - `HypothesisError::MissingAssertion` if either operand has no assertion
    pub fn and(&self, other: &Hypothesis) -> Result<Hypothesis, HypothesisError> {
        let first = self.require_assertion()?;
        let second = other.require_assertion()?;
        let assertion: AssertionFn = Arc::new(move |subject| {
            let first = Arc::clone(&first);
            let second = Arc::clone(&second);
            async move {
                first(Arc::clone(&subject)).await?;
                second(subject).await
            }
            .boxed()
        });

        Ok(Hypothesis {
            name: format!("{} AND {}", self.name, other.name),
            kind: AssertionKind::And,
            assertion: Some(assertion),
        })
    }

    /// Require this or `other`
    ///
    /// `other` is only evaluated if this hypothesis fails. When both fail the
    /// failure of this hypothesis is surfaced, not the failure of `other`.
    ///
    /// # Errors
    /// - `HypothesisError::MissingAssertion` if either operand has no assertion
    pub fn or(&self, other: &Hypothesis) -> Result<Hypothesis, HypothesisError> {
        let first = self.require_assertion()?;
        let second = other.require_assertion()?;
        let assertion: AssertionFn = Arc::new(move |subject| {
            let first = Arc::clone(&first);
            let second = Arc::clone(&second);
            async move {
                match first(Arc::clone(&subject)).await {
                    Ok(()) => Ok(()),
                    Err(first_failure) => match second(subject).await {
                        Ok(()) => Ok(()),
                        Err(_) => Err(first_failure),
                    },
                }
            }
            .boxed()
        });

        Ok(Hypothesis {
            name: format!("{} OR {}", self.name, other.name),
            kind: AssertionKind::Or,
            assertion: Some(assertion),
        })
    }

    fn require_assertion(&self) -> Result<AssertionFn, HypothesisError> {
        self.assertion
            .clone()
            .ok_or_else(|| HypothesisError::MissingAssertion {
                name: self.name.clone(),
            })
    }
}

impl fmt::Debug for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hypothesis")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_assertion", &self.assertion.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::StaticSubject;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn subject() -> SubjectRef {
        StaticSubject::new().into_ref()
    }

    fn pass(name: &str) -> Hypothesis {
        Hypothesis::check(name, |_| Ok(()))
    }

    fn fail(name: &str, message: &'static str) -> Hypothesis {
        Hypothesis::check(name, move |_| Err(AssertionFailure::new(message)))
    }

    fn counting(name: &str, calls: &Arc<AtomicUsize>, passes: bool) -> Hypothesis {
        let calls = Arc::clone(calls);
        Hypothesis::check(name, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            if passes {
                Ok(())
            } else {
                Err(AssertionFailure::new("counted failure"))
            }
        })
    }

    #[tokio::test]
    async fn validate_passes_when_assertion_holds() {
        let result = pass("holds").validate(&subject()).await;
        assert!(result.passed);
        assert_eq!(result.name, "holds");
        assert!(result.message.is_none());
        assert_eq!(result.assertion_kind, AssertionKind::Custom);
    }

    #[tokio::test]
    async fn validate_records_failure_message() {
        let result = fail("breaks", "boom").validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn validate_without_assertion_fails_with_fixed_message() {
        let result = Hypothesis::named("bare").validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some(NO_ASSERTION_MESSAGE));
    }

    #[tokio::test]
    async fn validate_captures_panicking_assertion() {
        let hypothesis = Hypothesis::check("panics", |_| panic!("kaboom"));
        let result = hypothesis.validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("assertion panicked: kaboom"));
    }

    #[tokio::test]
    async fn validate_captures_panic_before_future_is_built() {
        let hypothesis = Hypothesis::new("eager", |_| -> futures::future::Ready<AssertionOutcome> {
            panic!("no future")
        });
        let result = hypothesis.validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("assertion panicked: no future"));

        // a panic is not a failure to invert
        let negated = hypothesis.not().unwrap().validate(&subject()).await;
        assert!(!negated.passed);
        assert_eq!(negated.message.as_deref(), Some("assertion panicked: no future"));
    }

    #[tokio::test]
    async fn not_inverts_outcome() {
        let negated_fail = fail("a", "nope").not().unwrap();
        assert_eq!(negated_fail.name(), "NOT a");
        assert_eq!(negated_fail.kind(), AssertionKind::Not);
        assert!(negated_fail.validate(&subject()).await.passed);

        let result = pass("b").not().unwrap().validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some(NEGATION_PASSED_MESSAGE));
    }

    #[tokio::test]
    async fn and_short_circuits_on_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let combined = fail("a", "first broke")
            .and(&counting("b", &calls, true))
            .unwrap();

        let result = combined.validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("first broke"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.name, "a AND b");
    }

    #[tokio::test]
    async fn and_evaluates_both_when_first_passes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let combined = pass("a").and(&counting("b", &calls, false)).unwrap();

        let result = combined.validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("counted failure"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn or_skips_second_when_first_passes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let combined = pass("a").or(&counting("b", &calls, true)).unwrap();

        assert!(combined.validate(&subject()).await.passed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn or_passes_when_only_second_passes() {
        let combined = fail("a", "first").or(&pass("b")).unwrap();
        assert!(combined.validate(&subject()).await.passed);
    }

    #[tokio::test]
    async fn or_reports_first_failure_when_both_fail() {
        let combined = fail("a", "first failure")
            .or(&fail("b", "second failure"))
            .unwrap();

        let result = combined.validate(&subject()).await;
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("first failure"));
        assert_eq!(result.name, "a OR b");
    }

    #[test]
    fn combinators_reject_bare_operands() {
        let bare = Hypothesis::named("bare");
        let real = pass("real");

        assert_eq!(
            bare.not().unwrap_err(),
            HypothesisError::MissingAssertion { name: "bare".into() }
        );
        assert!(real.and(&bare).is_err());
        assert!(bare.and(&real).is_err());
        assert!(real.or(&bare).is_err());
        assert!(bare.or(&bare).is_err());
    }

    #[tokio::test]
    async fn combinators_leave_operands_untouched() {
        let a = fail("a", "x");
        let b = pass("b");
        let _ = a.and(&b).unwrap();
        let _ = a.not().unwrap();

        assert_eq!(a.name(), "a");
        assert_eq!(a.kind(), AssertionKind::Custom);
        assert!(!a.validate(&subject()).await.passed);
        assert!(b.validate(&subject()).await.passed);
    }

    #[test]
    fn assertion_kind_serializes_to_factory_name() {
        let json = serde_json::to_string(&AssertionKind::HaveState).unwrap();
        assert_eq!(json, "\"toHaveState\"");
        assert_eq!(AssertionKind::Eventually.to_string(), "toEventually");
    }
}
