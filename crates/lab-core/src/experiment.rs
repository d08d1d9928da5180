//! Experiment state machine
//!
//! An experiment binds a subject, an ordered list of hypotheses, and optional
//! setup/test/teardown hooks. [`Experiment::run`] drives one run:
//!
//! 1. `skip` short-circuits to a passing, empty result
//! 2. each attempt runs setup, requires a subject, runs the test hook, then
//!    validates every hypothesis in order
//! 3. teardown runs after every attempt, and its failures are only logged
//! 4. setup/test failures are retried up to `max_retries` times

use crate::cancel::CancellationToken;
use crate::context::RunContext;
use crate::error::{HookStage, LabError};
use crate::types::{ExperimentId, ExperimentResult, ExperimentState};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use lab_hypothesis::{panic_message, Hypothesis, HypothesisResult, SubjectRef};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Future returned by a hook
pub type HookFuture = BoxFuture<'static, anyhow::Result<()>>;

type Hook = Arc<dyn Fn(RunContext) -> HookFuture + Send + Sync>;
type TestHook = Arc<dyn Fn(SubjectRef, RunContext) -> HookFuture + Send + Sync>;

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Call a hook and await its future, turning a panic in either into an error
async fn run_hook<F>(call: F) -> anyhow::Result<()>
where
    F: FnOnce() -> HookFuture,
{
    AssertUnwindSafe(async move { call().await })
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(anyhow::anyhow!(
                "hook panicked: {}",
                panic_message(payload.as_ref())
            ))
        })
}

/// One test scenario
pub struct Experiment {
    id: ExperimentId,
    name: String,
    description: Option<String>,
    subject: Option<SubjectRef>,
    hypotheses: Vec<Hypothesis>,
    setup: Option<Hook>,
    test: Option<TestHook>,
    teardown: Option<Hook>,
    skip: bool,
    only: bool,
    timeout: Option<Duration>,
    max_retries: u32,
    state: ExperimentState,
    retries: u32,
}

impl Experiment {
    /// Create pending experiment
    #[must_use]
    pub fn new(id: impl Into<ExperimentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            subject: None,
            hypotheses: Vec::new(),
            setup: None,
            test: None,
            teardown: None,
            skip: false,
            only: false,
            timeout: None,
            max_retries: 0,
            state: ExperimentState::Pending,
            retries: 0,
        }
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With subject under test
    #[must_use]
    pub fn with_subject(mut self, subject: SubjectRef) -> Self {
        self.subject = Some(subject);
        self
    }

    /// With hypothesis appended
    #[must_use]
    pub fn with_hypothesis(mut self, hypothesis: Hypothesis) -> Self {
        self.hypotheses.push(hypothesis);
        self
    }

    /// Append hypothesis
    pub fn add_hypothesis(&mut self, hypothesis: Hypothesis) {
        self.hypotheses.push(hypothesis);
    }

    /// With setup hook
    ///
    /// Retries re-run setup against the same subject, so setup is where
    /// subject state should be reset between attempts.
    #[must_use]
    pub fn with_setup<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.setup = Some(Arc::new(move |ctx| hook(ctx).boxed()));
        self
    }

    /// With test hook, run against the bound subject
    #[must_use]
    pub fn with_test<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(SubjectRef, RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.test = Some(Arc::new(move |subject, ctx| hook(subject, ctx).boxed()));
        self
    }

    /// With teardown hook
    #[must_use]
    pub fn with_teardown<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.teardown = Some(Arc::new(move |ctx| hook(ctx).boxed()));
        self
    }

    /// With skip flag
    #[inline]
    #[must_use]
    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// With focus flag
    #[inline]
    #[must_use]
    pub fn with_only(mut self, only: bool) -> Self {
        self.only = only;
        self
    }

    /// With timeout overriding the laboratory default
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// With retry budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Get ID
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get description
    #[inline]
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get subject
    #[inline]
    #[must_use]
    pub fn subject(&self) -> Option<&SubjectRef> {
        self.subject.as_ref()
    }

    /// Hypotheses in registration order
    #[inline]
    #[must_use]
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Get state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ExperimentState {
        self.state
    }

    /// Retries consumed by the current or last run
    #[inline]
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Get retry budget
    #[inline]
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get timeout override
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether the experiment is skipped
    #[inline]
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Whether the experiment is focused
    #[inline]
    #[must_use]
    pub fn is_only(&self) -> bool {
        self.only
    }

    /// Run with a fresh cancellation token
    pub async fn run(&mut self) -> ExperimentResult {
        self.run_with(CancellationToken::new()).await
    }

    /// Run, stopping at the next checkpoint once `token` is cancelled
    ///
    /// Never fails: hook errors, a missing subject, and cancellation all end
    /// up in the returned result's `error`.
    pub async fn run_with(&mut self, token: CancellationToken) -> ExperimentResult {
        if self.skip {
            self.state = ExperimentState::Skipped;
            tracing::info!(experiment = %self.id, "experiment skipped");
            return self.result(true, Vec::new(), None, 0);
        }

        self.retries = 0;
        loop {
            self.state = ExperimentState::Running;
            let started = Instant::now();
            let ctx = RunContext::new(
                self.id.clone(),
                self.retries,
                self.subject.clone(),
                token.clone(),
            );
            tracing::debug!(experiment = %self.id, attempt = self.retries, "attempt started");

            let outcome = self.attempt(&ctx).await;
            self.run_teardown(&ctx).await;
            let duration_ms = millis(started.elapsed());

            match outcome {
                Ok(hypotheses) => {
                    let success = hypotheses.iter().all(|h| h.passed);
                    self.state = if success {
                        ExperimentState::Passed
                    } else {
                        ExperimentState::Failed
                    };
                    tracing::info!(
                        experiment = %self.id,
                        success,
                        retries = self.retries,
                        duration_ms,
                        "experiment finished"
                    );
                    return self.result(success, hypotheses, None, duration_ms);
                }
                Err(err)
                    if err.is_retryable()
                        && self.retries < self.max_retries
                        && !token.is_cancelled() =>
                {
                    self.retries += 1;
                    tracing::warn!(
                        experiment = %self.id,
                        retry = self.retries,
                        max_retries = self.max_retries,
                        error = %err,
                        "attempt failed, retrying"
                    );
                }
                Err(err) => {
                    self.state = ExperimentState::Failed;
                    tracing::warn!(
                        experiment = %self.id,
                        retries = self.retries,
                        error = %err,
                        "experiment errored"
                    );
                    return self.result(false, Vec::new(), Some(err.to_string()), duration_ms);
                }
            }
        }
    }

    /// Return to `pending` and forget retries
    pub fn reset(&mut self) {
        self.state = ExperimentState::Pending;
        self.retries = 0;
    }

    /// Run teardown, then reset
    pub async fn cleanup(&mut self) {
        let ctx = RunContext::new(
            self.id.clone(),
            self.retries,
            self.subject.clone(),
            CancellationToken::new(),
        );
        self.run_teardown(&ctx).await;
        self.reset();
    }

    async fn attempt(&self, ctx: &RunContext) -> Result<Vec<HypothesisResult>, LabError> {
        if let Some(setup) = &self.setup {
            tracing::debug!(experiment = %self.id, "running setup");
            run_hook(|| setup(ctx.clone()))
                .await
                .map_err(|err| LabError::hook(HookStage::Setup, &err))?;
        }
        self.checkpoint(ctx)?;

        let subject = self
            .subject
            .clone()
            .ok_or_else(|| LabError::MissingSubject {
                id: self.id.clone(),
            })?;

        if let Some(test) = &self.test {
            tracing::debug!(experiment = %self.id, "running test hook");
            run_hook(|| test(Arc::clone(&subject), ctx.clone()))
                .await
                .map_err(|err| LabError::hook(HookStage::Test, &err))?;
        }
        self.checkpoint(ctx)?;

        let mut results = Vec::with_capacity(self.hypotheses.len());
        for hypothesis in &self.hypotheses {
            results.push(hypothesis.validate(&subject).await);
        }
        Ok(results)
    }

    fn checkpoint(&self, ctx: &RunContext) -> Result<(), LabError> {
        if ctx.is_cancelled() {
            return Err(LabError::Cancelled {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    async fn run_teardown(&self, ctx: &RunContext) {
        let Some(teardown) = &self.teardown else {
            return;
        };
        if let Err(err) = run_hook(|| teardown(ctx.clone())).await {
            let err = LabError::TeardownError {
                id: self.id.clone(),
                message: format!("{err:#}"),
            };
            tracing::warn!(experiment = %self.id, error = %err, "teardown failed");
        }
    }

    fn result(
        &self,
        success: bool,
        hypotheses: Vec<HypothesisResult>,
        error: Option<String>,
        duration_ms: u64,
    ) -> ExperimentResult {
        ExperimentResult {
            experiment_id: self.id.clone(),
            experiment_name: self.name.clone(),
            success,
            timestamp: Utc::now(),
            duration_ms,
            hypotheses,
            error,
            retries: (self.retries > 0).then_some(self.retries),
        }
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("hypotheses", &self.hypotheses.len())
            .field("has_subject", &self.subject.is_some())
            .field("skip", &self.skip)
            .field("only", &self.only)
            .field("max_retries", &self.max_retries)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}
